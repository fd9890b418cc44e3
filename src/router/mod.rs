//! Gateway Router Module
//!
//! Maps an inbound path prefix to a service name, resolves a live endpoint for it and forwards the
//! request unchanged apart from connection-level headers.
//!
//! ## Behaviour
//! - **Routing**: static prefix table, segment-boundary matching, longest prefix wins.
//! - **Failures**: any resolution, breaker or transport failure becomes one `502` envelope; the
//!   gateway never retries.
//! - **Health**: `GET /health` aggregates the per-service state from discovery.

pub mod gateway;
pub mod handlers;
pub mod protocol;
pub mod types;
