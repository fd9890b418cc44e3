use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A concrete network address implementing a named service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl From<std::net::SocketAddr> for Endpoint {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Health of a registered service as seen by the probe loop.
///
/// Outside of `Unknown` (never probed) the state is derived from the consecutive failure
/// counter alone, see [`HealthState::from_failures`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown,
    Healthy,
    Degraded,
    Down,
}

impl HealthState {
    pub fn from_failures(consecutive_failures: u32, failure_threshold: u32) -> Self {
        if consecutive_failures == 0 {
            Self::Healthy
        } else if consecutive_failures >= failure_threshold.max(1) {
            Self::Down
        } else {
            Self::Degraded
        }
    }

    /// Routing is optimistic: degraded services still receive traffic.
    pub fn is_routable(self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }
}

/// Where and how long to probe a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub path: String,
    pub timeout: Duration,
}

impl ProbeTarget {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        Self { path, timeout }
    }
}

impl Default for ProbeTarget {
    fn default() -> Self {
        Self::new("/health", Duration::from_secs(3))
    }
}

/// Health check settings carried by a registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub path: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            interval_ms: 10_000,
            timeout_ms: 3_000,
        }
    }
}

impl HealthCheck {
    pub fn probe_target(&self) -> ProbeTarget {
        ProbeTarget::new(self.path.clone(), Duration::from_millis(self.timeout_ms))
    }
}

/// Idempotent upsert announced by a service on startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRegistration {
    /// Unique instance id, e.g. `catalog-service-5002`.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub health_check: HealthCheck,
}

impl ServiceRegistration {
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        let name = name.into();
        Self {
            id: format!("{}-{}", name, endpoint.port),
            name,
            address: endpoint.address,
            port: endpoint.port,
            tags: Vec::new(),
            health_check: HealthCheck::default(),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.port)
    }

    /// The explicit id, or `name-port` when the registration left it out.
    pub fn instance_id(&self) -> String {
        if self.id.trim().is_empty() {
            format!("{}-{}", self.name, self.port)
        } else {
            self.id.clone()
        }
    }
}

/// One endpoint of an entry together with what the last probe saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointState {
    pub endpoint: Endpoint,
    /// `None` until the first probe of this endpoint completes.
    pub reachable: Option<bool>,
}

/// One per logical service name.
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub name: String,
    pub endpoints: Vec<EndpointState>,
    pub tags: Vec<String>,
    pub probe: ProbeTarget,
    pub health_state: HealthState,
    pub consecutive_failures: u32,
    pub last_probed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Bumped on every (re-)registration; stale probe results are dropped.
    pub generation: u64,
    pub(crate) cursor: usize,
}

impl ServiceEntry {
    pub fn new(
        name: impl Into<String>,
        endpoints: Vec<Endpoint>,
        probe: ProbeTarget,
        tags: Vec<String>,
        generation: u64,
    ) -> Self {
        Self {
            name: name.into(),
            endpoints: endpoints
                .into_iter()
                .map(|endpoint| EndpointState {
                    endpoint,
                    reachable: None,
                })
                .collect(),
            tags,
            probe,
            health_state: HealthState::Unknown,
            consecutive_failures: 0,
            last_probed_at: None,
            last_error: None,
            generation,
            cursor: 0,
        }
    }

    pub fn primary_url(&self) -> Option<String> {
        self.endpoints.first().map(|state| state.endpoint.url())
    }

    pub fn reachable_count(&self) -> usize {
        self.endpoints
            .iter()
            .filter(|state| state.reachable == Some(true))
            .count()
    }
}

/// Directory-level notifications.
///
/// Only transitions into and out of `Down` are published for health changes; degradations are
/// tracked on the entry but not announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEvent {
    Registered {
        name: String,
    },
    Deregistered {
        name: String,
    },
    Down {
        name: String,
        consecutive_failures: u32,
        error: Option<String>,
    },
    Up {
        name: String,
    },
}

impl DirectoryEvent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "service:registered",
            Self::Deregistered { .. } => "service:unregistered",
            Self::Down { .. } => "service:down",
            Self::Up { .. } => "service:up",
        }
    }

    pub fn service(&self) -> &str {
        match self {
            Self::Registered { name }
            | Self::Deregistered { name }
            | Self::Down { name, .. }
            | Self::Up { name } => name,
        }
    }
}

/// Backend-neutral view of a service, shared by `/registry` and `/health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    pub name: String,
    pub url: Option<String>,
    pub status: HealthState,
    pub failure_count: u32,
    pub last_check: Option<DateTime<Utc>>,
    pub instances: usize,
    pub healthy_instances: usize,
}

impl From<&ServiceEntry> for ServiceView {
    fn from(entry: &ServiceEntry) -> Self {
        Self {
            name: entry.name.clone(),
            url: entry.primary_url(),
            status: entry.health_state,
            failure_count: entry.consecutive_failures,
            last_check: entry.last_probed_at,
            instances: entry.endpoints.len(),
            healthy_instances: entry.reachable_count(),
        }
    }
}

/// Counts per health state, excluding the directory owner itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryStats {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub down: usize,
    pub unknown: usize,
}

impl DirectoryStats {
    pub fn from_states(states: impl IntoIterator<Item = HealthState>) -> Self {
        let mut stats = Self::default();
        for state in states {
            stats.total += 1;
            match state {
                HealthState::Healthy => stats.healthy += 1,
                HealthState::Degraded => stats.degraded += 1,
                HealthState::Down => stats.down += 1,
                HealthState::Unknown => stats.unknown += 1,
            }
        }
        stats
    }
}
