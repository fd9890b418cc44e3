//! Directory HTTP Protocol
//!
//! Endpoints and DTOs for querying the directory and for service self-registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{HealthState, ServiceView};

/// Directory query (`GET`), registration (`POST`) and deregistration (`DELETE /{name}`).
pub const ENDPOINT_REGISTRY: &str = "/registry";
/// Liveness endpoint every role exposes for probing.
pub const ENDPOINT_HEALTH: &str = "/health";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryItem {
    pub name: String,
    pub url: Option<String>,
    pub status: HealthState,
    pub failure_count: u32,
    pub last_check: Option<DateTime<Utc>>,
}

impl From<ServiceView> for RegistryItem {
    fn from(view: ServiceView) -> Self {
        Self {
            name: view.name,
            url: view.url,
            status: view.status,
            failure_count: view.failure_count,
            last_check: view.last_check,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistryResponse {
    pub services: Vec<RegistryItem>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub service: String,
    pub id: String,
}

/// Query of `DELETE /registry/:name` naming the instance being withdrawn.
#[derive(Debug, Default, Deserialize)]
pub struct DeregisterQuery {
    pub address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeregisterResponse {
    pub success: bool,
    pub removed: bool,
}

/// Body of every role's `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

impl LivenessResponse {
    pub fn ok(service: &str) -> Self {
        Self {
            status: "ok".to_string(),
            service: service.to_string(),
            timestamp: Utc::now(),
        }
    }
}
