//! Health Probe
//!
//! Issues one liveness check against one endpoint. Timeouts, refused connections and non-2xx
//! answers all collapse to `reachable = false`; the error text is kept for diagnostics only.

use std::time::{Duration, Instant};

use super::types::{Endpoint, ProbeTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub reachable: bool,
    pub latency: Duration,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn reachable(latency: Duration) -> Self {
        Self {
            reachable: true,
            latency,
            error: None,
        }
    }

    pub fn unreachable(latency: Duration, error: impl Into<String>) -> Self {
        Self {
            reachable: false,
            latency,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthProbe {
    http_client: reqwest::Client,
}

impl HealthProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    pub async fn probe(&self, endpoint: &Endpoint, target: &ProbeTarget) -> ProbeOutcome {
        let url = format!("{}{}", endpoint.url(), target.path);
        let started = Instant::now();

        let result = self
            .http_client
            .get(&url)
            .timeout(target.timeout)
            .send()
            .await;
        let latency = started.elapsed();

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::trace!("Probe {} ok in {:?}", url, latency);
                ProbeOutcome::reachable(latency)
            }
            Ok(response) => ProbeOutcome::unreachable(
                latency,
                format!("unexpected status {}", response.status()),
            ),
            Err(e) if e.is_timeout() => {
                ProbeOutcome::unreachable(latency, format!("timed out after {:?}", target.timeout))
            }
            Err(e) => ProbeOutcome::unreachable(latency, e.to_string()),
        }
    }
}
