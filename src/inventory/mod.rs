//! Inventory Holder Module
//!
//! The catalog role: owns the items and their unit counters and exposes the conditional
//! `PUT /items/{id}/units` mutation the loans role relies on to never hand out a unit twice.

pub mod handlers;
pub mod protocol;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;
