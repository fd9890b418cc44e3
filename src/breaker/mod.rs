//! Circuit Breaker Module
//!
//! Wraps outbound calls to another service so that a dependency known to be failing is not
//! hammered further.
//!
//! ## States
//! - **Closed**: calls pass through; consecutive failures are counted.
//! - **Open**: calls are rejected without a network attempt until the recovery timeout passes.
//! - **HalfOpen**: exactly one trial call is let through; its outcome closes or re-opens the breaker.

pub mod circuit;
pub mod types;
