//! Lending Mesh Library
//!
//! Building blocks for a small lending platform split into services: a gateway that routes by
//! path prefix to whichever instance its health-aware directory currently considers live, a
//! catalog service that holds item stock, and a loans service that hands out and takes back
//! units without ever overselling. The binary (`main.rs`) composes them into one of three roles.
//!
//! ## Architecture Modules
//! - **`directory`**: Service registry with a periodic health probe, a per-service health state
//!   machine and `service:down` / `service:up` events. Local or Consul backed.
//! - **`router`**: The gateway. Prefix routing, request forwarding with per-call timeouts and a
//!   single 502 envelope for every failure, plus the aggregate `/health` report.
//! - **`breaker`**: Per-dependency circuit breakers (`Closed -> Open -> HalfOpen`).
//! - **`inventory`**: The item store and its conditional unit counter, the compare-and-swap the
//!   lending protocol is built on.
//! - **`loans`**: The borrow/return coordinator, its ledger and the HTTP clients it uses to reach
//!   the catalog and user services.
//! - **`caller`**, **`config`**, **`error`**, **`shutdown`**: Request identity, CLI, the shared
//!   error taxonomy and signal handling.

pub mod breaker;
pub mod caller;
pub mod config;
pub mod directory;
pub mod error;
pub mod inventory;
pub mod loans;
pub mod router;
pub mod shutdown;
