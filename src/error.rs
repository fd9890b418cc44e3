//! Error taxonomy shared by the directory, router and inventory coordinator.
//!
//! Every variant maps to an HTTP status and, where callers need to branch on it, a stable
//! machine-readable `code`. Handlers render errors as the `{success:false, message, code?}`
//! envelope via [`IntoResponse`].

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine code returned to callers that lost the race on the last unit.
pub const CODE_RACE_CONDITION: &str = "RACE_CONDITION";
/// Machine code returned by the inventory holder when a conditional decrement is refused.
pub const CODE_NOT_AVAILABLE: &str = "NOT_AVAILABLE";
/// Machine code returned when an increment would exceed the item's total units.
pub const CODE_CEILING_EXCEEDED: &str = "CEILING_EXCEEDED";
/// Machine code returned when the breaker protecting a dependency is open.
pub const CODE_CIRCUIT_OPEN: &str = "CIRCUIT_OPEN";

pub type Result<T, E = MeshError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeshError {
    /// No live endpoint for the named service.
    #[error("Service {service} unavailable")]
    ServiceUnavailable { service: String },

    #[error("Service {service} did not respond within {timeout_ms}ms")]
    UpstreamTimeout { service: String, timeout_ms: u64 },

    /// Transport failure or unexpected answer from a collaborator.
    #[error("Service {service} failed: {reason}")]
    Upstream { service: String, reason: String },

    #[error("{service} circuit breaker OPEN")]
    CircuitOpen { service: String },

    /// Lost the race on the conditional decrement.
    #[error("Item was taken by a concurrent request, please try again")]
    Conflict,

    /// Raised by the inventory holder when the conditional guard fails.
    #[error("Item not available for borrowing")]
    NotAvailable,

    #[error("No copies available")]
    NoUnitsAvailable,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Not authorized")]
    Forbidden,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    InvalidState(String),

    #[error("Available units cannot exceed total units")]
    CeilingExceeded,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl MeshError {
    pub fn already_returned() -> Self {
        Self::InvalidState("Item already returned".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ServiceUnavailable { .. } | Self::CircuitOpen { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Conflict | Self::NotAvailable => StatusCode::CONFLICT,
            Self::NoUnitsAvailable
            | Self::InvalidState(_)
            | Self::CeilingExceeded
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Conflict => Some(CODE_RACE_CONDITION),
            Self::NotAvailable => Some(CODE_NOT_AVAILABLE),
            Self::CeilingExceeded => Some(CODE_CEILING_EXCEEDED),
            Self::CircuitOpen { .. } => Some(CODE_CIRCUIT_OPEN),
            _ => None,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            success: false,
            message: self.to_string(),
            code: self.code().map(str::to_string),
        }
    }
}

/// The JSON body every failing endpoint answers with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for MeshError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_race_condition() {
        let err = MeshError::Conflict;
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.envelope().code.as_deref(), Some("RACE_CONDITION"));
        assert!(!err.envelope().success);
    }

    #[test]
    fn test_already_returned_is_bad_request() {
        let err = MeshError::already_returned();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("already returned"));
        assert!(err.envelope().code.is_none());
    }

    #[test]
    fn test_envelope_omits_missing_code() {
        let json = serde_json::to_value(MeshError::NoUnitsAvailable.envelope()).unwrap();
        assert_eq!(json["message"], "No copies available");
        assert!(json.get("code").is_none());
    }
}
