use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inventory::types::InventoryItem;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Returned,
}

/// One unit of one item held by one caller.
///
/// An `Active` record only ever exists after the matching conditional decrement succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoanRecord {
    pub id: String,
    pub item_id: String,
    pub holder_id: String,
    pub status: LoanStatus,
    pub acquired_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl LoanRecord {
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }
}

/// What the identity service knows about a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    #[serde(alias = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_string()
}

impl UserProfile {
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            username: "Unknown User".to_string(),
            role: default_role(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemSummary {
    pub id: String,
    pub title: String,
    pub author: String,
}

impl ItemSummary {
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: "Unknown Item".to_string(),
            author: "Unknown".to_string(),
        }
    }
}

impl From<InventoryItem> for ItemSummary {
    fn from(item: InventoryItem) -> Self {
        Self {
            id: item.id,
            title: item.title,
            author: item.author,
        }
    }
}

/// A loan enriched with item and, for the admin view, holder details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoanView {
    #[serde(flatten)]
    pub loan: LoanRecord,
    pub item: ItemSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<UserProfile>,
}
