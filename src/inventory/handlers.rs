use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, put},
};
use std::sync::Arc;

use super::protocol::{
    DeleteResponse, ENDPOINT_ITEMS, ENDPOINT_ITEMS_ALIAS, ItemListResponse, ListQuery, Pagination,
    UnitsRequest, UnitsResponse,
};
use super::store::ItemStore;
use super::types::{InventoryItem, ItemUpdate, NewItem};
use crate::caller::{Caller, InternalToken, ServiceCaller};
use crate::error::MeshError;

const DEFAULT_PAGE_SIZE: usize = 10;

pub async fn handle_list_items(
    Extension(store): Extension<Arc<ItemStore>>,
    Query(query): Query<ListQuery>,
) -> (StatusCode, Json<ItemListResponse>) {
    let items = store.list();

    if query.page.is_none() && query.limit.is_none() {
        return (StatusCode::OK, Json(ItemListResponse::All(items)));
    }

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
    let total = items.len();
    let data = items
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();

    (
        StatusCode::OK,
        Json(ItemListResponse::Paged {
            data,
            pagination: Pagination {
                current: page,
                pages: total.div_ceil(limit),
                total,
                limit,
            },
        }),
    )
}

pub async fn handle_get_item(
    Extension(store): Extension<Arc<ItemStore>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<InventoryItem>), MeshError> {
    Ok((StatusCode::OK, Json(store.get(&id)?)))
}

pub async fn handle_create_item(
    Extension(store): Extension<Arc<ItemStore>>,
    caller: Caller,
    Json(new_item): Json<NewItem>,
) -> Result<(StatusCode, Json<InventoryItem>), MeshError> {
    caller.require_admin()?;
    let item = store.create(new_item)?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn handle_update_item(
    Extension(store): Extension<Arc<ItemStore>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(update): Json<ItemUpdate>,
) -> Result<(StatusCode, Json<InventoryItem>), MeshError> {
    caller.require_admin()?;
    Ok((StatusCode::OK, Json(store.update(&id, update)?)))
}

pub async fn handle_delete_item(
    Extension(store): Extension<Arc<ItemStore>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<DeleteResponse>), MeshError> {
    caller.require_admin()?;
    store.remove(&id)?;
    Ok((
        StatusCode::OK,
        Json(DeleteResponse {
            success: true,
            message: "Item deleted successfully".to_string(),
        }),
    ))
}

/// Service-to-service unit mutation. A refused conditional decrement answers
/// `409 {code: "NOT_AVAILABLE"}`.
/// Reserved for peer services; user headers are ignored here.
pub async fn handle_adjust_units(
    _service: ServiceCaller,
    Extension(store): Extension<Arc<ItemStore>>,
    Path(id): Path<String>,
    Json(req): Json<UnitsRequest>,
) -> Result<(StatusCode, Json<UnitsResponse>), MeshError> {
    let item = store.adjust_units(&id, req.delta, req.conditional)?;
    Ok((
        StatusCode::OK,
        Json(UnitsResponse {
            success: true,
            item,
        }),
    ))
}

fn item_routes(router: Router, base: &str) -> Router {
    router
        .route(base, get(handle_list_items).post(handle_create_item))
        .route(
            &format!("{}/:id", base),
            get(handle_get_item)
                .put(handle_update_item)
                .delete(handle_delete_item),
        )
        .route(&format!("{}/:id/units", base), put(handle_adjust_units))
}

/// Routes of the catalog role, without `/health`.
pub fn catalog_app(store: Arc<ItemStore>, token: InternalToken) -> Router {
    let router = item_routes(Router::new(), ENDPOINT_ITEMS);
    item_routes(router, ENDPOINT_ITEMS_ALIAS)
        .layer(Extension(store))
        .layer(Extension(token))
}
