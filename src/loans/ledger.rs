use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::types::{LoanRecord, LoanStatus};
use crate::error::{MeshError, Result};

/// Persistence for loan records.
#[async_trait]
pub trait LoanLedger: Send + Sync {
    async fn create(&self, item_id: &str, holder_id: &str) -> Result<LoanRecord>;

    async fn get(&self, id: &str) -> Result<LoanRecord>;

    /// `Active -> Returned` as one step; a record that is already returned is rejected.
    async fn mark_returned(&self, id: &str) -> Result<LoanRecord>;

    /// Undoes `mark_returned` when the unit could not be handed back.
    async fn revert_return(&self, id: &str) -> Result<LoanRecord>;

    async fn list(&self) -> Result<Vec<LoanRecord>>;

    async fn list_for_holder(&self, holder_id: &str) -> Result<Vec<LoanRecord>>;
}

#[derive(Default)]
pub struct MemoryLoanLedger {
    records: DashMap<String, LoanRecord>,
}

fn not_found() -> MeshError {
    MeshError::NotFound("Loan record".to_string())
}

impl MemoryLoanLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn sorted(mut records: Vec<LoanRecord>) -> Vec<LoanRecord> {
        records.sort_by(|a, b| {
            b.acquired_at
                .cmp(&a.acquired_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }
}

#[async_trait]
impl LoanLedger for MemoryLoanLedger {
    async fn create(&self, item_id: &str, holder_id: &str) -> Result<LoanRecord> {
        let record = LoanRecord {
            id: Uuid::new_v4().to_string(),
            item_id: item_id.to_string(),
            holder_id: holder_id.to_string(),
            status: LoanStatus::Active,
            acquired_at: Utc::now(),
            released_at: None,
        };
        self.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<LoanRecord> {
        self.records
            .get(id)
            .map(|record| record.value().clone())
            .ok_or_else(not_found)
    }

    async fn mark_returned(&self, id: &str) -> Result<LoanRecord> {
        let mut record = self.records.get_mut(id).ok_or_else(not_found)?;

        if record.status != LoanStatus::Active {
            return Err(MeshError::already_returned());
        }

        record.status = LoanStatus::Returned;
        record.released_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn revert_return(&self, id: &str) -> Result<LoanRecord> {
        let mut record = self.records.get_mut(id).ok_or_else(not_found)?;

        if record.status != LoanStatus::Returned {
            return Err(MeshError::InvalidState(format!(
                "Loan {} is not returned",
                id
            )));
        }

        record.status = LoanStatus::Active;
        record.released_at = None;
        Ok(record.clone())
    }

    async fn list(&self) -> Result<Vec<LoanRecord>> {
        Ok(Self::sorted(
            self.records.iter().map(|r| r.value().clone()).collect(),
        ))
    }

    async fn list_for_holder(&self, holder_id: &str) -> Result<Vec<LoanRecord>> {
        Ok(Self::sorted(
            self.records
                .iter()
                .filter(|r| r.holder_id == holder_id)
                .map(|r| r.value().clone())
                .collect(),
        ))
    }
}
