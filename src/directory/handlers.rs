use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
};
use std::sync::Arc;

use super::protocol::{
    DeregisterQuery, DeregisterResponse, LivenessResponse, RegisterResponse, RegistryItem, RegistryResponse,
};
use super::service::ServiceDirectory;
use super::types::{Endpoint, ServiceRegistration, ServiceView};
use crate::error::MeshError;

pub async fn handle_list_services(
    Extension(directory): Extension<Arc<ServiceDirectory>>,
) -> (StatusCode, Json<RegistryResponse>) {
    let services = directory
        .snapshot()
        .iter()
        .map(|entry| RegistryItem::from(ServiceView::from(entry)))
        .collect();

    (StatusCode::OK, Json(RegistryResponse { services }))
}

/// Upserts the registration and probes it right away so it becomes routable without waiting
/// for the next cycle.
pub async fn handle_register(
    Extension(directory): Extension<Arc<ServiceDirectory>>,
    Json(registration): Json<ServiceRegistration>,
) -> Result<(StatusCode, Json<RegisterResponse>), MeshError> {
    if registration.name.trim().is_empty() {
        return Err(MeshError::BadRequest("Service name is required".to_string()));
    }
    if registration.address.trim().is_empty() || registration.port == 0 {
        return Err(MeshError::BadRequest(
            "Service address and port are required".to_string(),
        ));
    }

    directory.register_endpoints(
        &registration.name,
        vec![registration.endpoint()],
        registration.health_check.probe_target(),
        registration.tags.clone(),
    );

    let name = registration.name.clone();
    let probing = directory.clone();
    tokio::spawn(async move {
        if let Some(report) = probing.probe_service(&name).await {
            tracing::debug!("Initial probe of {}: {:?}", name, report.state);
        }
    });

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            service: registration.name.clone(),
            id: registration.instance_id(),
        }),
    ))
}

/// With `address` and `port` only that instance is withdrawn; without them the whole entry goes.
pub async fn handle_deregister(
    Extension(directory): Extension<Arc<ServiceDirectory>>,
    Path(name): Path<String>,
    Query(query): Query<DeregisterQuery>,
) -> (StatusCode, Json<DeregisterResponse>) {
    let removed = match (query.address, query.port) {
        (Some(address), Some(port)) => {
            directory.deregister_instance(&name, &Endpoint::new(address, port))
        }
        _ => directory.deregister(&name),
    };
    (
        StatusCode::OK,
        Json(DeregisterResponse {
            success: true,
            removed,
        }),
    )
}

/// Liveness answer shared by every role; the service name is injected as an extension.
pub async fn handle_liveness(
    Extension(service): Extension<ServiceName>,
) -> (StatusCode, Json<LivenessResponse>) {
    (StatusCode::OK, Json(LivenessResponse::ok(&service.0)))
}

/// Name a process answers `/health` with.
#[derive(Debug, Clone)]
pub struct ServiceName(pub String);
