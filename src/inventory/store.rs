use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::types::{InventoryItem, ItemUpdate, NewItem};
use crate::error::{MeshError, Result};

/// The authoritative holder of an item's unit counters, local or remote.
#[async_trait]
pub trait InventoryHolder: Send + Sync {
    async fn get_item(&self, id: &str) -> Result<InventoryItem>;

    /// Applies `delta` to `available_units` as one indivisible step at the holder.
    ///
    /// With `conditional` set the update only happens if the stored value can absorb the delta,
    /// otherwise `NotAvailable` is returned and nothing changes.
    async fn adjust_units(&self, id: &str, delta: i64, conditional: bool) -> Result<InventoryItem>;
}

/// In-memory item store keyed by id.
///
/// Every mutation of an item runs under that item's `DashMap` write guard, which is what makes
/// the conditional decrement a compare-and-swap.
#[derive(Default)]
pub struct ItemStore {
    items: DashMap<String, InventoryItem>,
}

fn not_found() -> MeshError {
    MeshError::NotFound("Item".to_string())
}

impl ItemStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create(&self, new_item: NewItem) -> Result<InventoryItem> {
        if new_item.title.trim().is_empty() || new_item.author.trim().is_empty() {
            return Err(MeshError::BadRequest(
                "Title and author are required".to_string(),
            ));
        }

        let total_units = new_item.total_units.unwrap_or(1);
        let now = Utc::now();
        let item = InventoryItem {
            id: Uuid::new_v4().to_string(),
            title: new_item.title,
            author: new_item.author,
            isbn: new_item.isbn,
            published_year: new_item.published_year,
            genre: new_item.genre,
            total_units,
            available_units: total_units,
            created_at: now,
            updated_at: now,
        };

        self.items.insert(item.id.clone(), item.clone());
        tracing::info!("Item created: {} ({}, {} units)", item.id, item.title, total_units);
        Ok(item)
    }

    pub fn get(&self, id: &str) -> Result<InventoryItem> {
        self.items
            .get(id)
            .map(|item| item.value().clone())
            .ok_or_else(not_found)
    }

    /// Every item, newest first.
    pub fn list(&self) -> Vec<InventoryItem> {
        let mut items: Vec<InventoryItem> =
            self.items.iter().map(|item| item.value().clone()).collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn update(&self, id: &str, update: ItemUpdate) -> Result<InventoryItem> {
        let mut item = self.items.get_mut(id).ok_or_else(not_found)?;

        if let Some(total_units) = update.total_units {
            let on_loan = item.on_loan();
            if total_units < on_loan {
                return Err(MeshError::InvalidState(format!(
                    "Total units cannot drop below the {} units on loan",
                    on_loan
                )));
            }
            item.available_units = total_units - on_loan;
            item.total_units = total_units;
        }
        if let Some(title) = update.title {
            item.title = title;
        }
        if let Some(author) = update.author {
            item.author = author;
        }
        if update.isbn.is_some() {
            item.isbn = update.isbn;
        }
        if update.published_year.is_some() {
            item.published_year = update.published_year;
        }
        if update.genre.is_some() {
            item.genre = update.genre;
        }
        item.updated_at = Utc::now();

        Ok(item.clone())
    }

    pub fn remove(&self, id: &str) -> Result<InventoryItem> {
        let (_, item) = self.items.remove(id).ok_or_else(not_found)?;
        tracing::info!("Item deleted: {}", id);
        Ok(item)
    }

    pub fn adjust_units(&self, id: &str, delta: i64, conditional: bool) -> Result<InventoryItem> {
        let mut item = self.items.get_mut(id).ok_or_else(not_found)?;

        // Counts are non-negative, so only an upward delta can overflow.
        let next = i64::from(item.available_units)
            .checked_add(delta)
            .ok_or(MeshError::CeilingExceeded)?;

        if next < 0 {
            if conditional {
                tracing::debug!(
                    "Conditional adjust of {} by {} refused ({} available)",
                    id,
                    delta,
                    item.available_units
                );
                return Err(MeshError::NotAvailable);
            }
            return Err(MeshError::InvalidState(
                "Available units cannot be negative".to_string(),
            ));
        }
        if next > i64::from(item.total_units) {
            return Err(MeshError::CeilingExceeded);
        }

        item.available_units = next as u32;
        item.updated_at = Utc::now();

        tracing::info!(
            "Units of {} adjusted by {} -> {}/{} (conditional={})",
            id,
            delta,
            item.available_units,
            item.total_units,
            conditional
        );
        Ok(item.clone())
    }
}

#[async_trait]
impl InventoryHolder for ItemStore {
    async fn get_item(&self, id: &str) -> Result<InventoryItem> {
        self.get(id)
    }

    async fn adjust_units(&self, id: &str, delta: i64, conditional: bool) -> Result<InventoryItem> {
        ItemStore::adjust_units(self, id, delta, conditional)
    }
}
