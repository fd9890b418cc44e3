//! Loans Module
//!
//! The borrow/return protocol. The coordinator talks to the inventory holder through the
//! gateway (or direct discovery) and records loans in a ledger.
//!
//! ## Ordering
//! - **Acquire**: read, conditional decrement at the holder, then create the record. A failed
//!   record triggers one compensating increment.
//! - **Release**: mark the record returned (the double-return guard), then increment. A failed
//!   increment reverts the record once.
//! - **Listings**: item and user lookups run concurrently; any that fail become placeholders.

pub mod client;
pub mod coordinator;
pub mod handlers;
pub mod ledger;
pub mod protocol;
pub mod types;
