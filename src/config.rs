//! Command line and environment configuration for the three roles.
//!
//! Every flag has an environment fallback so the same binary can be driven from a compose file.
//! The `*_config()` helpers turn parsed arguments into the plain config structs the library uses.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::breaker::types::BreakerConfig;
use crate::directory::service::DirectoryConfig;
use crate::directory::types::{Endpoint, ServiceRegistration};
use crate::router::types::{GatewayConfig, Route, RouteTable};

#[derive(Parser, Debug)]
#[command(name = "lending-mesh")]
#[command(about = "Health-aware gateway, catalog and lending services")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub role: Role,
}

#[derive(Subcommand, Debug)]
pub enum Role {
    /// Service directory, probe loop and request router.
    Gateway(GatewayArgs),
    /// Inventory holder for catalog items.
    Catalog(CatalogArgs),
    /// Borrow/return coordinator.
    Loans(LoansArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// In-process directory fed by `/registry` and `--service`.
    #[default]
    Local,
    /// External Consul agent.
    Consul,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamMode {
    /// Every call goes through the gateway.
    #[default]
    Gateway,
    /// Resolve each dependency and call it directly.
    Discovery,
}

#[derive(Args, Debug, Clone)]
pub struct BreakerArgs {
    /// Consecutive transport failures before a breaker opens.
    #[arg(long, env = "BREAKER_THRESHOLD", default_value_t = 5)]
    pub breaker_threshold: u32,

    /// Milliseconds an open breaker waits before letting a trial call through.
    #[arg(long, env = "BREAKER_RECOVERY_MS", default_value_t = 30_000)]
    pub breaker_recovery_ms: u64,
}

impl BreakerArgs {
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker_threshold,
            recovery_timeout: Duration::from_millis(self.breaker_recovery_ms),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct GatewayArgs {
    #[arg(long, env = "GATEWAY_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    #[arg(long, env = "SERVICE_NAME", default_value = "api-gateway")]
    pub name: String,

    #[arg(long, env = "DISCOVERY_BACKEND", value_enum, default_value_t = Backend::Local)]
    pub backend: Backend,

    #[arg(long, env = "CONSUL_URL", default_value = "http://localhost:8500")]
    pub consul_url: String,

    #[arg(
        long,
        env = "PROBE_INTERVAL_MS",
        default_value_t = 60_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub probe_interval_ms: u64,

    /// Consecutive failed probes before a service is marked down.
    #[arg(long, env = "FAILURE_THRESHOLD", default_value_t = 3)]
    pub failure_threshold: u32,

    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 5_000)]
    pub request_timeout_ms: u64,

    /// Forward without per-service circuit breakers.
    #[arg(long)]
    pub no_breaker: bool,

    /// Extra route, e.g. `--route /reports=report-service`. Repeatable.
    #[arg(long = "route", value_name = "/PREFIX=SERVICE")]
    pub routes: Vec<Route>,

    /// Static registration, e.g. `--service catalog-service=127.0.0.1:5002`. Repeatable.
    #[arg(long = "service", value_name = "NAME=HOST:PORT")]
    pub services: Vec<StaticService>,

    #[command(flatten)]
    pub breaker: BreakerArgs,
}

impl GatewayArgs {
    pub fn directory_config(&self) -> DirectoryConfig {
        DirectoryConfig {
            failure_threshold: self.failure_threshold,
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            self_name: Some(self.name.clone()),
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            service_name: self.name.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            use_breaker: !self.no_breaker,
            ..GatewayConfig::default()
        }
    }

    /// Default routes with the `--route` entries layered on top.
    pub fn route_table(&self) -> RouteTable {
        let mut table = RouteTable::with_defaults();
        for route in &self.routes {
            table.insert(&route.prefix, &route.service);
        }
        table
    }
}

/// How a service role announces itself.
#[derive(Args, Debug, Clone)]
pub struct RegistrationArgs {
    #[arg(long, env = "GATEWAY_URL", default_value = "http://localhost:3000")]
    pub gateway_url: String,

    #[arg(long, env = "DISCOVERY_BACKEND", value_enum, default_value_t = Backend::Local)]
    pub backend: Backend,

    #[arg(long, env = "CONSUL_URL", default_value = "http://localhost:8500")]
    pub consul_url: String,

    /// Host other processes reach this one on. Defaults to the bind address.
    #[arg(long, env = "ADVERTISE_HOST")]
    pub advertise_host: Option<String>,

    /// Skip self-registration.
    #[arg(long)]
    pub no_register: bool,
}

impl RegistrationArgs {
    pub fn registration(&self, name: &str, bind: SocketAddr) -> ServiceRegistration {
        let host = match &self.advertise_host {
            Some(host) => host.clone(),
            None if bind.ip().is_unspecified() => "127.0.0.1".to_string(),
            None => bind.ip().to_string(),
        };
        ServiceRegistration::new(name, Endpoint::new(host, bind.port()))
    }
}

#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    #[arg(long, env = "CATALOG_BIND", default_value = "0.0.0.0:5002")]
    pub bind: SocketAddr,

    #[arg(long, env = "SERVICE_NAME", default_value = "catalog-service")]
    pub name: String,

    /// Shared secret peer services must present to adjust units.
    #[arg(long, env = "INTERNAL_TOKEN", hide_env_values = true)]
    pub internal_token: String,

    #[command(flatten)]
    pub registration: RegistrationArgs,
}

#[derive(Args, Debug, Clone)]
pub struct LoansArgs {
    #[arg(long, env = "LOANS_BIND", default_value = "0.0.0.0:5003")]
    pub bind: SocketAddr,

    #[arg(long, env = "SERVICE_NAME", default_value = "loan-service")]
    pub name: String,

    /// Whether catalog and user calls go through the gateway or straight to the service.
    #[arg(long, env = "LOANS_UPSTREAM", value_enum, default_value_t = UpstreamMode::Gateway)]
    pub upstream: UpstreamMode,

    #[arg(long, env = "CALL_TIMEOUT_MS", default_value_t = 3_000)]
    pub call_timeout_ms: u64,

    /// Directly reachable dependencies when `--upstream discovery` runs without Consul.
    #[arg(long = "service", value_name = "NAME=HOST:PORT")]
    pub services: Vec<StaticService>,

    #[arg(
        long,
        env = "PROBE_INTERVAL_MS",
        default_value_t = 10_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub probe_interval_ms: u64,

    /// Shared secret presented to the catalog when adjusting units.
    #[arg(long, env = "INTERNAL_TOKEN", hide_env_values = true)]
    pub internal_token: String,

    #[command(flatten)]
    pub registration: RegistrationArgs,

    #[command(flatten)]
    pub breaker: BreakerArgs,
}

impl LoansArgs {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Directory used for direct discovery with the local backend.
    pub fn directory_config(&self) -> DirectoryConfig {
        DirectoryConfig {
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            self_name: Some(self.name.clone()),
            ..DirectoryConfig::default()
        }
    }
}

/// `name=host:port` given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticService {
    pub name: String,
    pub endpoint: Endpoint,
}

impl FromStr for StaticService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || format!("expected name=host:port, got '{}'", s);

        let (name, addr) = s.split_once('=').ok_or_else(malformed)?;
        let (host, port) = addr.rsplit_once(':').ok_or_else(malformed)?;
        let port: u16 = port.parse().map_err(|_| malformed())?;

        let name = name.trim();
        let host = host.trim();
        if name.is_empty() || host.is_empty() || port == 0 {
            return Err(malformed());
        }

        Ok(Self {
            name: name.to_string(),
            endpoint: Endpoint::new(host, port),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("lending-mesh").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_gateway_defaults() {
        let Role::Gateway(args) = parse(&["gateway"]).role else {
            panic!("Expected gateway role");
        };

        assert_eq!(args.bind.port(), 3000);
        assert_eq!(args.backend, Backend::Local);

        let directory = args.directory_config();
        assert_eq!(directory.failure_threshold, 3);
        assert_eq!(directory.probe_interval, Duration::from_secs(60));
        assert_eq!(directory.self_name.as_deref(), Some("api-gateway"));

        let gateway = args.gateway_config();
        assert_eq!(gateway.request_timeout, Duration::from_secs(5));
        assert!(gateway.use_breaker);

        let breaker = args.breaker.breaker_config();
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.recovery_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_gateway_routes_and_static_services() {
        let Role::Gateway(args) = parse(&[
            "gateway",
            "--route",
            "/reports=report-service",
            "--route",
            "/items=inventory-v2",
            "--service",
            "catalog-service=10.0.0.5:5002",
            "--no-breaker",
        ])
        .role
        else {
            panic!("Expected gateway role");
        };

        let table = args.route_table();
        assert_eq!(table.lookup("/reports/daily"), Some("report-service"));
        assert_eq!(table.lookup("/items/1"), Some("inventory-v2"));
        assert_eq!(table.lookup("/loans"), Some("loan-service"));

        assert_eq!(
            args.services,
            vec![StaticService {
                name: "catalog-service".to_string(),
                endpoint: Endpoint::new("10.0.0.5", 5002),
            }]
        );
        assert!(!args.gateway_config().use_breaker);
    }

    #[test]
    fn test_rejects_malformed_service() {
        assert!("catalog-service".parse::<StaticService>().is_err());
        assert!("catalog-service=host".parse::<StaticService>().is_err());
        assert!("=host:80".parse::<StaticService>().is_err());
        assert!("svc=host:0".parse::<StaticService>().is_err());
        assert!(
            Cli::try_parse_from(["lending-mesh", "gateway", "--route", "no-equals"]).is_err()
        );
    }

    #[test]
    fn test_registration_advertises_reachable_host() {
        let Role::Catalog(args) =
            parse(&["catalog", "--bind", "0.0.0.0:5102", "--internal-token", "t"]).role
        else {
            panic!("Expected catalog role");
        };

        let registration = args.registration.registration(&args.name, args.bind);
        assert_eq!(registration.name, "catalog-service");
        assert_eq!(registration.id, "catalog-service-5102");
        assert_eq!(registration.address, "127.0.0.1");

        let Role::Loans(args) = parse(&[
            "loans",
            "--advertise-host",
            "loans.internal",
            "--internal-token",
            "t",
        ])
        .role
        else {
            panic!("Expected loans role");
        };
        let registration = args.registration.registration(&args.name, args.bind);
        assert_eq!(registration.address, "loans.internal");
        assert_eq!(registration.port, 5003);
        assert_eq!(args.upstream, UpstreamMode::Gateway);
        assert_eq!(args.call_timeout(), Duration::from_secs(3));
        assert_eq!(args.internal_token, "t");
    }

    #[test]
    fn test_rejects_zero_probe_interval() {
        assert!(
            Cli::try_parse_from(["lending-mesh", "gateway", "--probe-interval-ms", "0"]).is_err()
        );
        assert!(
            Cli::try_parse_from([
                "lending-mesh",
                "loans",
                "--internal-token",
                "t",
                "--probe-interval-ms",
                "0",
            ])
            .is_err()
        );

        let Role::Gateway(args) = parse(&["gateway", "--probe-interval-ms", "1"]).role else {
            panic!("Expected gateway role");
        };
        assert_eq!(args.directory_config().probe_interval, Duration::from_millis(1));
    }
}
