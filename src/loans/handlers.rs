use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, put},
};
use std::sync::Arc;

use super::coordinator::InventoryCoordinator;
use super::protocol::{AcquireRequest, ENDPOINT_LOANS, ENDPOINT_LOANS_ALIAS};
use super::types::{LoanRecord, LoanView};
use crate::caller::Caller;
use crate::error::MeshError;

pub async fn handle_acquire(
    Extension(coordinator): Extension<Arc<InventoryCoordinator>>,
    caller: Caller,
    Json(req): Json<AcquireRequest>,
) -> Result<(StatusCode, Json<LoanRecord>), MeshError> {
    let loan = coordinator.acquire(&caller, &req.item_id).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

pub async fn handle_release(
    Extension(coordinator): Extension<Arc<InventoryCoordinator>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<LoanRecord>), MeshError> {
    let loan = coordinator.release(&caller, &id).await?;
    Ok((StatusCode::OK, Json(loan)))
}

pub async fn handle_list_all(
    Extension(coordinator): Extension<Arc<InventoryCoordinator>>,
    caller: Caller,
) -> Result<(StatusCode, Json<Vec<LoanView>>), MeshError> {
    Ok((StatusCode::OK, Json(coordinator.list_all(&caller).await?)))
}

pub async fn handle_list_mine(
    Extension(coordinator): Extension<Arc<InventoryCoordinator>>,
    caller: Caller,
) -> Result<(StatusCode, Json<Vec<LoanView>>), MeshError> {
    Ok((StatusCode::OK, Json(coordinator.list_for(&caller).await?)))
}

fn loan_routes(router: Router, base: &str) -> Router {
    router
        .route(base, get(handle_list_all).post(handle_acquire))
        .route(&format!("{}/me", base), get(handle_list_mine))
        .route(&format!("{}/:id/release", base), put(handle_release))
        .route(&format!("{}/:id/return", base), put(handle_release))
}

/// Routes of the loans role, without `/health`.
pub fn loans_app(coordinator: Arc<InventoryCoordinator>) -> Router {
    let router = loan_routes(Router::new(), ENDPOINT_LOANS);
    loan_routes(router, ENDPOINT_LOANS_ALIAS).layer(Extension(coordinator))
}
