use axum::{
    Json, Router,
    extract::{Extension, Request},
    http::StatusCode,
    response::Response,
    routing::{delete, get},
};
use std::sync::Arc;

use super::gateway::Gateway;
use super::protocol::GatewayHealthResponse;
use crate::directory::handlers::{handle_deregister, handle_list_services, handle_register};
use crate::directory::protocol::{ENDPOINT_HEALTH, ENDPOINT_REGISTRY, RegistryItem, RegistryResponse};
use crate::directory::service::ServiceDirectory;
use crate::error::MeshError;

pub async fn handle_proxy(
    Extension(gateway): Extension<Arc<Gateway>>,
    request: Request,
) -> Response {
    gateway.route(request).await
}

pub async fn handle_gateway_health(
    Extension(gateway): Extension<Arc<Gateway>>,
) -> Result<(StatusCode, Json<GatewayHealthResponse>), MeshError> {
    let health = gateway.health().await?;
    Ok((StatusCode::OK, Json(health)))
}

/// Read-only registry view for backends that manage registration themselves.
pub async fn handle_discovery_registry(
    Extension(gateway): Extension<Arc<Gateway>>,
) -> Result<(StatusCode, Json<RegistryResponse>), MeshError> {
    let services = gateway
        .discovery()
        .services()
        .await?
        .into_iter()
        .map(RegistryItem::from)
        .collect();
    Ok((StatusCode::OK, Json(RegistryResponse { services })))
}

/// Gateway HTTP surface: `/health`, `/registry` and a fallback that proxies everything else.
///
/// With a local directory the registry accepts registrations; otherwise it only reports what the
/// external backend knows.
pub fn gateway_app(gateway: Arc<Gateway>, directory: Option<Arc<ServiceDirectory>>) -> Router {
    let router = Router::new().route(ENDPOINT_HEALTH, get(handle_gateway_health));

    let router = match directory {
        Some(directory) => router
            .route(
                ENDPOINT_REGISTRY,
                get(handle_list_services).post(handle_register),
            )
            .route("/registry/:name", delete(handle_deregister))
            .layer(Extension(directory)),
        None => router.route(ENDPOINT_REGISTRY, get(handle_discovery_registry)),
    };

    router
        .fallback(handle_proxy)
        .layer(Extension(gateway))
}
