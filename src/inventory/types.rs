use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lendable item together with its unit counters.
///
/// `available_units` never drops below zero nor exceeds `total_units`; `total_units -
/// available_units` is the number of units currently out on loan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    pub total_units: u32,
    pub available_units: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn on_loan(&self) -> u32 {
        self.total_units - self.available_units
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub published_year: Option<i32>,
    #[serde(default)]
    pub genre: Option<String>,
    /// Defaults to one unit; every unit starts available.
    #[serde(default)]
    pub total_units: Option<u32>,
}

impl NewItem {
    pub fn new(title: impl Into<String>, author: impl Into<String>, total_units: u32) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            isbn: None,
            published_year: None,
            genre: None,
            total_units: Some(total_units),
        }
    }
}

/// Partial update of descriptive fields and of the unit total.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub published_year: Option<i32>,
    pub genre: Option<String>,
    /// Changing the total shifts `available_units` by the same amount; units on loan are kept.
    pub total_units: Option<u32>,
}
