use axum::{Router, extract::Extension, routing::get};
use clap::Parser;
use lending_mesh::breaker::circuit::BreakerRegistry;
use lending_mesh::caller::InternalToken;
use lending_mesh::config::{
    Backend, CatalogArgs, Cli, GatewayArgs, LoansArgs, RegistrationArgs, Role, StaticService,
    UpstreamMode,
};
use lending_mesh::directory::consul::ConsulDiscovery;
use lending_mesh::directory::discovery::{Discovery, GatewayRegistrar, Registrar};
use lending_mesh::directory::handlers::{ServiceName, handle_liveness};
use lending_mesh::directory::protocol::ENDPOINT_HEALTH;
use lending_mesh::directory::service::{DirectoryConfig, ServiceDirectory, spawn_event_logger};
use lending_mesh::directory::types::ProbeTarget;
use lending_mesh::inventory::handlers::catalog_app;
use lending_mesh::inventory::store::ItemStore;
use lending_mesh::loans::client::{HttpIdentity, RemoteInventory, ServiceClient, Upstream};
use lending_mesh::loans::coordinator::InventoryCoordinator;
use lending_mesh::loans::handlers::loans_app;
use lending_mesh::loans::ledger::MemoryLoanLedger;
use lending_mesh::router::gateway::Gateway;
use lending_mesh::router::handlers::gateway_app;
use lending_mesh::shutdown::shutdown_signal;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.role {
        Role::Gateway(args) => run_gateway(args).await,
        Role::Catalog(args) => run_catalog(args).await,
        Role::Loans(args) => run_loans(args).await,
    }
}

async fn run_gateway(args: GatewayArgs) -> anyhow::Result<()> {
    tracing::info!("Starting {} on {} ({:?} discovery)", args.name, args.bind, args.backend);

    // 1. Discovery:
    let (discovery, directory): (Arc<dyn Discovery>, Option<Arc<ServiceDirectory>>) =
        match args.backend {
            Backend::Local => {
                let directory = local_directory(args.directory_config(), &args.services);
                let discovery: Arc<dyn Discovery> = directory.clone();
                (discovery, Some(directory))
            }
            Backend::Consul => {
                tracing::info!("Resolving services through Consul at {}", args.consul_url);
                let consul: Arc<dyn Discovery> = Arc::new(ConsulDiscovery::new(&args.consul_url));
                (consul, None)
            }
        };

    // 2. Router:
    let breakers = BreakerRegistry::new(args.breaker.breaker_config());
    let gateway = Gateway::new(
        args.route_table(),
        discovery,
        breakers,
        args.gateway_config(),
    );

    for route in gateway.routes().routes() {
        tracing::info!("  {} -> {}", route.prefix, route.service);
    }

    // 3. HTTP server:
    let app = gateway_app(gateway, directory);
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!("API Gateway listening on {}", args.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn run_catalog(args: CatalogArgs) -> anyhow::Result<()> {
    let store = ItemStore::new();
    let app = catalog_app(store, InternalToken(args.internal_token.clone()))
        .merge(liveness(&args.name));

    serve_service(&args.name, args.bind, &args.registration, app).await
}

async fn run_loans(args: LoansArgs) -> anyhow::Result<()> {
    let upstream = match args.upstream {
        UpstreamMode::Gateway => {
            tracing::info!("Calling dependencies through {}", args.registration.gateway_url);
            Upstream::Gateway(args.registration.gateway_url.clone())
        }
        UpstreamMode::Discovery => {
            let discovery: Arc<dyn Discovery> = match args.registration.backend {
                Backend::Local => local_directory(args.directory_config(), &args.services),
                Backend::Consul => Arc::new(ConsulDiscovery::new(&args.registration.consul_url)),
            };
            Upstream::Discovery(discovery)
        }
    };

    let client = Arc::new(
        ServiceClient::new(upstream)
            .with_timeout(args.call_timeout())
            .with_breakers(BreakerRegistry::new(args.breaker.breaker_config()))
            .with_internal_token(args.internal_token.clone()),
    );

    let coordinator = InventoryCoordinator::new(
        Arc::new(RemoteInventory::new(client.clone())),
        MemoryLoanLedger::new(),
        Arc::new(HttpIdentity::new(client)),
    );

    let app = loans_app(coordinator).merge(liveness(&args.name));

    serve_service(&args.name, args.bind, &args.registration, app).await
}

/// Directory seeded with static entries, probed and logged in the background.
fn local_directory(config: DirectoryConfig, services: &[StaticService]) -> Arc<ServiceDirectory> {
    let directory = ServiceDirectory::new(config);
    spawn_event_logger(directory.subscribe());

    for service in services {
        directory.register(&service.name, service.endpoint.clone(), ProbeTarget::default());
    }

    directory.clone().spawn_probe_loop();
    directory
}

fn liveness(name: &str) -> Router {
    Router::new()
        .route(ENDPOINT_HEALTH, get(handle_liveness))
        .layer(Extension(ServiceName(name.to_string())))
}

fn registrar_for(args: &RegistrationArgs) -> Arc<dyn Registrar> {
    match args.backend {
        Backend::Local => Arc::new(GatewayRegistrar::new(&args.gateway_url)),
        Backend::Consul => Arc::new(ConsulDiscovery::new(&args.consul_url)),
    }
}

/// Serves a service role, announcing it on startup and withdrawing it on shutdown.
async fn serve_service(
    name: &str,
    bind: SocketAddr,
    registration_args: &RegistrationArgs,
    app: Router,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("{} listening on {}", name, bind);

    let registration = registration_args.registration(name, bind);
    let registrar = (!registration_args.no_register).then(|| registrar_for(registration_args));

    if let Some(registrar) = &registrar {
        if let Err(e) = registrar.register(&registration).await {
            tracing::warn!("Registration of {} failed: {}", registration.instance_id(), e);
        }
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(registrar) = &registrar {
        if let Err(e) = registrar.deregister(&registration).await {
            tracing::warn!("Deregistration of {} failed: {}", registration.instance_id(), e);
        }
    }

    tracing::info!("{} stopped", name);
    Ok(())
}
