//! Inventory HTTP Protocol
//!
//! `PUT /items/{id}/units` is the service-to-service mutation used by the loans role; the rest is
//! the item CRUD surface.

use serde::{Deserialize, Serialize};

use super::types::InventoryItem;

pub const ENDPOINT_ITEMS: &str = "/items";
/// Path the catalog also answers under for older clients.
pub const ENDPOINT_ITEMS_ALIAS: &str = "/books";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitsRequest {
    pub delta: i64,
    #[serde(default)]
    pub conditional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitsResponse {
    pub success: bool,
    pub item: InventoryItem,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub current: usize,
    pub pages: usize,
    pub total: usize,
    pub limit: usize,
}

/// Plain array without paging parameters, `{data, pagination}` with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemListResponse {
    Paged {
        data: Vec<InventoryItem>,
        pagination: Pagination,
    },
    All(Vec<InventoryItem>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}
