//! Service Directory Module
//!
//! Keeps the name -> endpoint mapping the gateway routes on, together with a health state per
//! service that a periodic probe loop maintains.
//!
//! ## Core Mechanisms
//! - **Health State Machine**: `Unknown -> Healthy | Degraded | Down`, derived from the count of
//!   consecutive failed probes against a configurable threshold.
//! - **Probe Loop**: Every interval all entries except the gateway itself are probed in parallel;
//!   a result for an entry re-registered mid-probe is discarded via the entry generation.
//! - **Events**: Transitions into and out of `Down` are broadcast as `service:down` / `service:up`.
//! - **Backends**: The in-process directory and Consul both sit behind the `Discovery` trait.

pub mod consul;
pub mod discovery;
pub mod handlers;
pub mod probe;
pub mod protocol;
pub mod service;
pub mod types;
