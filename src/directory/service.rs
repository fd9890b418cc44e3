use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::probe::{HealthProbe, ProbeOutcome};
use super::types::{
    DirectoryEvent, DirectoryStats, Endpoint, HealthState, ProbeTarget, ServiceEntry,
};
use crate::error::{MeshError, Result};

const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Shortest period the probe loop runs at.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Consecutive failed probes before an entry is marked `Down`.
    pub failure_threshold: u32,
    pub probe_interval: Duration,
    /// Identity of the process owning the directory; never probed.
    pub self_name: Option<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            self_name: Some("api-gateway".to_string()),
        }
    }
}

/// Result of probing one entry during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub name: String,
    pub state: HealthState,
    pub consecutive_failures: u32,
}

/// In-memory registry of named services with a health state machine per entry.
///
/// Constructed once by the composition root and handed to the router and probe scheduler.
/// The map is written only by `register`/`deregister` and by probe results; every write to an
/// entry (and the event it triggers) happens under that entry's guard.
pub struct ServiceDirectory {
    entries: DashMap<String, ServiceEntry>,
    probe: HealthProbe,
    config: DirectoryConfig,
    events: broadcast::Sender<DirectoryEvent>,
    generation: AtomicU64,
}

impl ServiceDirectory {
    pub fn new(config: DirectoryConfig) -> Arc<Self> {
        Self::with_probe(config, HealthProbe::new())
    }

    pub fn with_probe(config: DirectoryConfig, probe: HealthProbe) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            entries: DashMap::new(),
            probe,
            config,
            events,
            generation: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.events.subscribe()
    }

    /// Creates or replaces the entry for `name`. The new entry starts `Unknown`.
    pub fn register(&self, name: &str, endpoint: Endpoint, probe: ProbeTarget) {
        self.register_endpoints(name, vec![endpoint], probe, Vec::new());
    }

    pub fn register_endpoints(
        &self,
        name: &str,
        endpoints: Vec<Endpoint>,
        probe: ProbeTarget,
        tags: Vec<String>,
    ) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let entry = ServiceEntry::new(name, endpoints, probe, tags, generation);

        tracing::info!(
            "Service registered: {} at {}",
            name,
            entry.primary_url().unwrap_or_else(|| "<no endpoints>".to_string())
        );

        self.entries.insert(name.to_string(), entry);
        let _ = self.events.send(DirectoryEvent::Registered {
            name: name.to_string(),
        });
    }

    /// Removes the entry. Absent names are a no-op; returns whether anything was removed.
    pub fn deregister(&self, name: &str) -> bool {
        let removed = self.entries.remove(name);
        self.finish_deregister(name, removed.is_some())
    }

    /// Removes the entry only while it still lists `endpoint`.
    ///
    /// An instance shutting down must not take out a replacement that registered under the same
    /// name from another address.
    pub fn deregister_instance(&self, name: &str, endpoint: &Endpoint) -> bool {
        let removed = self.entries.remove_if(name, |_, entry| {
            entry.endpoints.iter().any(|state| state.endpoint == *endpoint)
        });
        if removed.is_none() && self.entries.contains_key(name) {
            tracing::info!(
                "Ignoring deregister of {} from {}: entry belongs to another instance",
                name,
                endpoint.url()
            );
            return false;
        }
        self.finish_deregister(name, removed.is_some())
    }

    fn finish_deregister(&self, name: &str, removed: bool) -> bool {
        if removed {
            tracing::info!("Service unregistered: {}", name);
            let _ = self.events.send(DirectoryEvent::Deregistered {
                name: name.to_string(),
            });
        } else {
            tracing::debug!("Deregister for unknown service {}", name);
        }
        removed
    }

    /// Returns one live endpoint for `name`.
    ///
    /// `Healthy` and `Degraded` entries are routable; endpoints that answered the last probe are
    /// preferred and rotated round-robin.
    pub fn resolve(&self, name: &str) -> Result<Endpoint> {
        let unavailable = || MeshError::ServiceUnavailable {
            service: name.to_string(),
        };

        let mut entry = self.entries.get_mut(name).ok_or_else(unavailable)?;

        if !entry.health_state.is_routable() || entry.endpoints.is_empty() {
            return Err(unavailable());
        }

        let reachable: Vec<usize> = entry
            .endpoints
            .iter()
            .enumerate()
            .filter(|(_, state)| state.reachable == Some(true))
            .map(|(idx, _)| idx)
            .collect();

        let candidates: Vec<usize> = if reachable.is_empty() {
            (0..entry.endpoints.len()).collect()
        } else {
            reachable
        };

        let pick = candidates[entry.cursor % candidates.len()];
        entry.cursor = entry.cursor.wrapping_add(1);

        Ok(entry.endpoints[pick].endpoint.clone())
    }

    pub fn get(&self, name: &str) -> Option<ServiceEntry> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of every entry, ordered by name.
    pub fn snapshot(&self) -> Vec<ServiceEntry> {
        let mut entries: Vec<ServiceEntry> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn stats(&self) -> DirectoryStats {
        DirectoryStats::from_states(
            self.entries
                .iter()
                .filter(|entry| !self.is_self(entry.key()))
                .map(|entry| entry.value().health_state),
        )
    }

    fn is_self(&self, name: &str) -> bool {
        self.config.self_name.as_deref() == Some(name)
    }

    /// Probes a single entry right away, outside of the periodic cycle.
    pub async fn probe_service(&self, name: &str) -> Option<ProbeReport> {
        let (generation, endpoints, target) = {
            let entry = self.entries.get(name)?;
            (
                entry.generation,
                entry
                    .endpoints
                    .iter()
                    .map(|state| state.endpoint.clone())
                    .collect::<Vec<_>>(),
                entry.probe.clone(),
            )
        };

        let outcomes = self.probe_endpoints(endpoints, &target).await;
        self.apply_probe_result(name, generation, outcomes)
    }

    /// Probes every registered service except the directory owner itself.
    pub async fn run_probe_cycle(&self) -> Vec<ProbeReport> {
        let targets: Vec<(String, u64, Vec<Endpoint>, ProbeTarget)> = self
            .entries
            .iter()
            .filter(|entry| !self.is_self(entry.key()))
            .map(|entry| {
                let value = entry.value();
                (
                    value.name.clone(),
                    value.generation,
                    value
                        .endpoints
                        .iter()
                        .map(|state| state.endpoint.clone())
                        .collect(),
                    value.probe.clone(),
                )
            })
            .collect();

        tracing::debug!("Probe cycle over {} services", targets.len());

        let probes = targets
            .into_iter()
            .map(|(name, generation, endpoints, target)| async move {
                let outcomes = self.probe_endpoints(endpoints, &target).await;
                (name, generation, outcomes)
            });

        join_all(probes)
            .await
            .into_iter()
            .filter_map(|(name, generation, outcomes)| {
                self.apply_probe_result(&name, generation, outcomes)
            })
            .collect()
    }

    async fn probe_endpoints(
        &self,
        endpoints: Vec<Endpoint>,
        target: &ProbeTarget,
    ) -> Vec<(Endpoint, ProbeOutcome)> {
        let checks = endpoints.into_iter().map(|endpoint| async move {
            let outcome = self.probe.probe(&endpoint, target).await;
            (endpoint, outcome)
        });
        join_all(checks).await
    }

    /// Folds one probe round into the entry's state machine.
    ///
    /// Returns `None` when the entry is gone or was re-registered while the probe was in flight.
    pub fn apply_probe_result(
        &self,
        name: &str,
        generation: u64,
        outcomes: Vec<(Endpoint, ProbeOutcome)>,
    ) -> Option<ProbeReport> {
        let mut entry = self.entries.get_mut(name)?;

        if entry.generation != generation {
            tracing::debug!("Dropping stale probe result for {}", name);
            return None;
        }

        let mut first_error = None;
        let mut any_reachable = false;
        for (endpoint, outcome) in outcomes {
            if let Some(state) = entry
                .endpoints
                .iter_mut()
                .find(|state| state.endpoint == endpoint)
            {
                state.reachable = Some(outcome.reachable);
            }
            any_reachable |= outcome.reachable;
            if first_error.is_none() {
                first_error = outcome.error;
            }
        }

        let previous = entry.health_state;
        entry.last_probed_at = Some(Utc::now());

        if any_reachable {
            entry.consecutive_failures = 0;
            entry.last_error = None;
        } else {
            entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
            entry.last_error = first_error;
        }

        let next = HealthState::from_failures(
            entry.consecutive_failures,
            self.config.failure_threshold,
        );
        entry.health_state = next;

        match (previous, next) {
            (HealthState::Down, HealthState::Down) => {
                tracing::debug!(
                    "{} still down ({} failures)",
                    name,
                    entry.consecutive_failures
                );
            }
            (_, HealthState::Down) => {
                tracing::warn!(
                    "{} is down! ({} failures): {}",
                    name,
                    entry.consecutive_failures,
                    entry.last_error.as_deref().unwrap_or("unknown error")
                );
                let _ = self.events.send(DirectoryEvent::Down {
                    name: name.to_string(),
                    consecutive_failures: entry.consecutive_failures,
                    error: entry.last_error.clone(),
                });
            }
            (HealthState::Down, HealthState::Healthy) => {
                tracing::info!("{} is back online", name);
                let _ = self.events.send(DirectoryEvent::Up {
                    name: name.to_string(),
                });
            }
            (HealthState::Unknown, HealthState::Healthy) => {
                tracing::info!("{} discovered and healthy", name);
            }
            (HealthState::Degraded, HealthState::Degraded) => {}
            (_, HealthState::Degraded) => {
                tracing::warn!(
                    "{} is degraded ({} failures)",
                    name,
                    entry.consecutive_failures
                );
            }
            _ => {}
        }

        Some(ProbeReport {
            name: name.to_string(),
            state: next,
            consecutive_failures: entry.consecutive_failures,
        })
    }

    /// Runs `run_probe_cycle` on the configured interval until the handle is aborted.
    ///
    /// A zero interval is raised to [`MIN_PROBE_INTERVAL`].
    pub fn spawn_probe_loop(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.probe_interval.max(MIN_PROBE_INTERVAL);
            if period != self.config.probe_interval {
                tracing::warn!(
                    "Probe interval {:?} too short, using {:?}",
                    self.config.probe_interval,
                    period
                );
            }
            tracing::info!("Starting automatic health monitoring (every {:?})", period);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                self.run_probe_cycle().await;
            }
        })
    }
}

/// Drains directory events into the log until the directory is dropped.
pub fn spawn_event_logger(mut events: broadcast::Receiver<DirectoryEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event @ DirectoryEvent::Down { .. }) => {
                    tracing::warn!("{} {}", event.label(), event.service());
                }
                Ok(event) => {
                    tracing::info!("{} {}", event.label(), event.service());
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event logger lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
