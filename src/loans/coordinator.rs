use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::client::IdentityDirectory;
use super::ledger::LoanLedger;
use super::types::{ItemSummary, LoanRecord, LoanStatus, LoanView, UserProfile};
use crate::caller::Caller;
use crate::error::{MeshError, Result};
use crate::inventory::store::InventoryHolder;

/// Borrow/return protocol over a remote inventory holder and a loan ledger.
///
/// No lock is held across any call: two coordinators racing for the last unit are separated
/// only by the holder's conditional decrement. A loan record is created strictly after a
/// successful decrement, so active records never outnumber granted units.
pub struct InventoryCoordinator {
    inventory: Arc<dyn InventoryHolder>,
    ledger: Arc<dyn LoanLedger>,
    identity: Arc<dyn IdentityDirectory>,
}

impl InventoryCoordinator {
    pub fn new(
        inventory: Arc<dyn InventoryHolder>,
        ledger: Arc<dyn LoanLedger>,
        identity: Arc<dyn IdentityDirectory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inventory,
            ledger,
            identity,
        })
    }

    pub async fn acquire(&self, caller: &Caller, item_id: &str) -> Result<LoanRecord> {
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return Err(MeshError::BadRequest("Item ID is required".to_string()));
        }

        let item = self.inventory.get_item(item_id).await?;
        if item.available_units == 0 {
            return Err(MeshError::NoUnitsAvailable);
        }

        match self.inventory.adjust_units(item_id, -1, true).await {
            Ok(_) => {}
            Err(MeshError::NotAvailable) => {
                tracing::warn!(
                    "Race on last unit of {}: {} lost the conditional decrement",
                    item_id,
                    caller.id
                );
                return Err(MeshError::Conflict);
            }
            Err(e) => return Err(e),
        }

        match self.ledger.create(item_id, &caller.id).await {
            Ok(loan) => {
                tracing::info!("Loan {} created: {} took {}", loan.id, caller.id, item_id);
                Ok(loan)
            }
            Err(e) => {
                tracing::error!("Loan record for {} failed after decrement: {}", item_id, e);
                if let Err(rollback) = self.inventory.adjust_units(item_id, 1, false).await {
                    tracing::error!(
                        "Compensating increment of {} failed, one unit is stranded: {}",
                        item_id,
                        rollback
                    );
                }
                Err(e)
            }
        }
    }

    pub async fn release(&self, caller: &Caller, loan_id: &str) -> Result<LoanRecord> {
        let loan = self.ledger.get(loan_id).await?;

        if loan.holder_id != caller.id && !caller.is_privileged() {
            return Err(MeshError::Forbidden);
        }
        if loan.status == LoanStatus::Returned {
            return Err(MeshError::already_returned());
        }

        // Concurrent releases of the same loan are decided here.
        let returned = self.ledger.mark_returned(loan_id).await?;

        match self.inventory.adjust_units(&loan.item_id, 1, false).await {
            Ok(_) => {
                tracing::info!("Loan {} returned by {}", loan_id, caller.id);
                Ok(returned)
            }
            Err(MeshError::NotFound(_)) => {
                tracing::warn!(
                    "Item {} of loan {} no longer exists, keeping the return",
                    loan.item_id,
                    loan_id
                );
                Ok(returned)
            }
            Err(e) => {
                tracing::error!("Increment for returned loan {} failed: {}", loan_id, e);
                if let Err(revert) = self.ledger.revert_return(loan_id).await {
                    tracing::error!("Reverting loan {} to active failed: {}", loan_id, revert);
                }
                Err(e)
            }
        }
    }

    /// Every loan with item and holder details. Privileged callers only.
    pub async fn list_all(&self, caller: &Caller) -> Result<Vec<LoanView>> {
        caller.require_admin()?;
        let loans = self.ledger.list().await?;

        let (items, holders) = tokio::join!(
            self.item_summaries(&loans),
            self.holder_profiles(&loans)
        );

        Ok(loans
            .into_iter()
            .map(|loan| LoanView {
                item: items
                    .get(&loan.item_id)
                    .cloned()
                    .unwrap_or_else(|| ItemSummary::unknown(&loan.item_id)),
                holder: Some(
                    holders
                        .get(&loan.holder_id)
                        .cloned()
                        .unwrap_or_else(|| UserProfile::unknown(&loan.holder_id)),
                ),
                loan,
            })
            .collect())
    }

    /// The caller's own loans with item details.
    pub async fn list_for(&self, caller: &Caller) -> Result<Vec<LoanView>> {
        let loans = self.ledger.list_for_holder(&caller.id).await?;
        let items = self.item_summaries(&loans).await;

        Ok(loans
            .into_iter()
            .map(|loan| LoanView {
                item: items
                    .get(&loan.item_id)
                    .cloned()
                    .unwrap_or_else(|| ItemSummary::unknown(&loan.item_id)),
                holder: None,
                loan,
            })
            .collect())
    }

    async fn item_summaries(&self, loans: &[LoanRecord]) -> HashMap<String, ItemSummary> {
        let ids: HashSet<&str> = loans.iter().map(|loan| loan.item_id.as_str()).collect();

        let lookups = ids.into_iter().map(|id| async move {
            match self.inventory.get_item(id).await {
                Ok(item) => Some((id.to_string(), ItemSummary::from(item))),
                Err(e) => {
                    tracing::debug!("Item lookup {} failed: {}", id, e);
                    None
                }
            }
        });

        join_all(lookups).await.into_iter().flatten().collect()
    }

    async fn holder_profiles(&self, loans: &[LoanRecord]) -> HashMap<String, UserProfile> {
        let ids: HashSet<&str> = loans.iter().map(|loan| loan.holder_id.as_str()).collect();

        let lookups = ids.into_iter().map(|id| async move {
            match self.identity.lookup(id).await {
                Ok(profile) => Some((id.to_string(), profile)),
                Err(e) => {
                    tracing::debug!("User lookup {} failed: {}", id, e);
                    None
                }
            }
        });

        join_all(lookups).await.into_iter().flatten().collect()
    }
}
