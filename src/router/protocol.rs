//! Gateway HTTP Protocol
//!
//! Response headers the gateway stamps on forwarded traffic, the failure envelope and the shape
//! of the aggregate `/health` report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::breaker::types::BreakerSnapshot;
use crate::directory::types::HealthState;
use crate::error::MeshError;

pub const HEADER_POWERED_BY: &str = "x-powered-by";
pub const HEADER_GATEWAY_TIMESTAMP: &str = "x-gateway-timestamp";
pub const POWERED_BY: &str = "lending-mesh";

/// Body of every failed forward. Always sent with `502`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayErrorBody {
    pub success: bool,
    pub message: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GatewayErrorBody {
    pub fn from_error(service: &str, err: &MeshError) -> Self {
        Self {
            success: false,
            message: format!("Service {} unavailable", service),
            service: service.to_string(),
            timestamp: Utc::now(),
            code: err.code().map(str::to_string),
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayStatus {
    pub status: String,
    pub service: String,
    pub backend: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceHealth {
    pub service: String,
    pub status: HealthState,
    pub healthy: bool,
    pub instances: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub down: usize,
    pub overall: OverallHealth,
}

impl HealthSummary {
    /// `healthy` only when every service is healthy, `critical` as soon as one is down.
    pub fn from_services(services: &[ServiceHealth]) -> Self {
        let count = |state: HealthState| services.iter().filter(|s| s.status == state).count();
        let healthy = count(HealthState::Healthy);
        let degraded = count(HealthState::Degraded);
        let down = count(HealthState::Down);

        let overall = if down > 0 {
            OverallHealth::Critical
        } else if healthy == services.len() {
            OverallHealth::Healthy
        } else {
            OverallHealth::Degraded
        };

        Self {
            total: services.len(),
            healthy,
            degraded,
            down,
            overall,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayHealthResponse {
    pub gateway: GatewayStatus,
    pub services: Vec<ServiceHealth>,
    pub summary: HealthSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breakers: Vec<BreakerSnapshot>,
}
