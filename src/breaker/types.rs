use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::error::MeshError;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip a closed breaker.
    pub failure_threshold: u32,
    /// How long an open breaker rejects before allowing a trial call.
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
        }
    }
}

/// Point-in-time view of one breaker, for health reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    /// Milliseconds until a trial call is allowed; `None` unless open.
    pub retry_in_ms: Option<u64>,
}

/// Failure of a call made through a breaker.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without attempting the call.
    #[error("{name} circuit breaker OPEN (retry in {retry_in:?})")]
    Open { name: String, retry_in: Duration },
    /// The wrapped call ran and failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Open { .. } => None,
            Self::Inner(e) => Some(e),
        }
    }
}

impl From<BreakerError<MeshError>> for MeshError {
    fn from(err: BreakerError<MeshError>) -> Self {
        match err {
            BreakerError::Open { name, .. } => MeshError::CircuitOpen { service: name },
            BreakerError::Inner(e) => e,
        }
    }
}
