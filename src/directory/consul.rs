//! Consul-backed discovery.
//!
//! Consul runs the health checks itself; this client only registers instances, removes them on
//! shutdown and asks for passing instances when the router resolves a name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::discovery::{Discovery, Registrar};
use super::types::{Endpoint, HealthState, ServiceRegistration, ServiceView};
use crate::error::{MeshError, Result};

const CONSUL: &str = "consul";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthServiceEntry {
    node: ConsulNode,
    service: ConsulService,
    #[serde(default)]
    checks: Vec<ConsulCheck>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulNode {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulService {
    #[serde(default)]
    address: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulCheck {
    status: String,
}

impl HealthServiceEntry {
    fn endpoint(&self) -> Endpoint {
        let address = if self.service.address.is_empty() {
            self.node.address.clone()
        } else {
            self.service.address.clone()
        };
        Endpoint::new(address, self.service.port)
    }

    fn is_passing(&self) -> bool {
        self.checks.iter().all(|check| check.status == "passing")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    address: &'a str,
    port: u16,
    tags: &'a [String],
    check: AgentServiceCheck,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceCheck {
    #[serde(rename = "HTTP")]
    http: String,
    interval: String,
    timeout: String,
}

pub struct ConsulDiscovery {
    base_url: String,
    http_client: reqwest::Client,
}

impl ConsulDiscovery {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    fn consul_error(reason: impl ToString) -> MeshError {
        MeshError::Upstream {
            service: CONSUL.to_string(),
            reason: reason.to_string(),
        }
    }

    async fn health_entries(&self, service: &str, passing_only: bool) -> Result<Vec<HealthServiceEntry>> {
        let mut url = format!("{}/v1/health/service/{}", self.base_url, service);
        if passing_only {
            url.push_str("?passing=true");
        }

        let response = self
            .http_client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::consul_error)?;

        if !response.status().is_success() {
            return Err(Self::consul_error(format!(
                "health query for {} returned {}",
                service,
                response.status()
            )));
        }

        response.json().await.map_err(Self::consul_error)
    }

    async fn put(&self, url: String, body: Option<&AgentServiceRegistration<'_>>) -> Result<()> {
        let mut request = self.http_client.put(&url).timeout(REQUEST_TIMEOUT);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(Self::consul_error)?;
        if !response.status().is_success() {
            return Err(Self::consul_error(format!("{} returned {}", url, response.status())));
        }
        Ok(())
    }
}

#[async_trait]
impl Discovery for ConsulDiscovery {
    async fn resolve(&self, service: &str) -> Result<Endpoint> {
        let entries = self.health_entries(service, true).await?;

        match entries.first() {
            Some(entry) => Ok(entry.endpoint()),
            None => {
                tracing::warn!("[Consul] No healthy instances found for service: {}", service);
                Err(MeshError::ServiceUnavailable {
                    service: service.to_string(),
                })
            }
        }
    }

    async fn services(&self) -> Result<Vec<ServiceView>> {
        let url = format!("{}/v1/catalog/services", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::consul_error)?;

        let catalog: HashMap<String, Vec<String>> =
            response.json().await.map_err(Self::consul_error)?;

        let mut names: Vec<String> = catalog.into_keys().filter(|name| name != CONSUL).collect();
        names.sort();

        let mut views = Vec::with_capacity(names.len());
        for name in names {
            let view = match self.health_entries(&name, false).await {
                Ok(entries) => {
                    let instances = entries.len();
                    let healthy = entries.iter().filter(|entry| entry.is_passing()).count();
                    let status = if instances == 0 {
                        HealthState::Unknown
                    } else if healthy == instances {
                        HealthState::Healthy
                    } else if healthy == 0 {
                        HealthState::Down
                    } else {
                        HealthState::Degraded
                    };
                    ServiceView {
                        url: entries.first().map(|entry| entry.endpoint().url()),
                        name,
                        status,
                        failure_count: (instances - healthy) as u32,
                        last_check: None,
                        instances,
                        healthy_instances: healthy,
                    }
                }
                Err(e) => {
                    tracing::warn!("[Consul] Failed to get service {}: {}", name, e);
                    ServiceView {
                        name,
                        url: None,
                        status: HealthState::Unknown,
                        failure_count: 0,
                        last_check: None,
                        instances: 0,
                        healthy_instances: 0,
                    }
                }
            };
            views.push(view);
        }

        Ok(views)
    }

    fn backend(&self) -> &'static str {
        CONSUL
    }
}

#[async_trait]
impl Registrar for ConsulDiscovery {
    async fn register(&self, registration: &ServiceRegistration) -> Result<()> {
        let endpoint = registration.endpoint();
        let check = &registration.health_check;
        let instance_id = registration.instance_id();
        let body = AgentServiceRegistration {
            id: &instance_id,
            name: &registration.name,
            address: &registration.address,
            port: registration.port,
            tags: &registration.tags,
            check: AgentServiceCheck {
                http: format!("{}{}", endpoint.url(), check.probe_target().path),
                interval: format!("{}ms", check.interval_ms),
                timeout: format!("{}ms", check.timeout_ms),
            },
        };

        self.put(
            format!("{}/v1/agent/service/register", self.base_url),
            Some(&body),
        )
        .await?;

        tracing::info!(
            "[Consul] Service registered: {} ({}) at {}",
            registration.name,
            instance_id,
            endpoint
        );
        Ok(())
    }

    async fn deregister(&self, registration: &ServiceRegistration) -> Result<()> {
        self.put(
            format!(
                "{}/v1/agent/service/deregister/{}",
                self.base_url,
                registration.instance_id()
            ),
            None,
        )
        .await?;

        tracing::info!("[Consul] Service deregistered: {}", registration.instance_id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_entry_prefers_service_address() {
        let raw = serde_json::json!([
            {
                "Node": {"Address": "10.0.0.1"},
                "Service": {"ID": "catalog-service-5002", "Service": "catalog-service", "Address": "", "Port": 5002, "Tags": []},
                "Checks": [{"Status": "passing"}, {"Status": "passing"}]
            },
            {
                "Node": {"Address": "10.0.0.2"},
                "Service": {"Address": "10.0.0.9", "Port": 5003},
                "Checks": [{"Status": "critical"}]
            }
        ]);

        let entries: Vec<HealthServiceEntry> = serde_json::from_value(raw).unwrap();

        assert_eq!(entries[0].endpoint(), Endpoint::new("10.0.0.1", 5002));
        assert!(entries[0].is_passing());
        assert_eq!(entries[1].endpoint(), Endpoint::new("10.0.0.9", 5003));
        assert!(!entries[1].is_passing());
    }

    #[test]
    fn test_agent_registration_wire_format() {
        let tags = vec!["inventory".to_string()];
        let body = AgentServiceRegistration {
            id: "catalog-service-5002",
            name: "catalog-service",
            address: "localhost",
            port: 5002,
            tags: &tags,
            check: AgentServiceCheck {
                http: "http://localhost:5002/health".to_string(),
                interval: "10000ms".to_string(),
                timeout: "3000ms".to_string(),
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["ID"], "catalog-service-5002");
        assert_eq!(json["Name"], "catalog-service");
        assert_eq!(json["Port"], 5002);
        assert_eq!(json["Check"]["HTTP"], "http://localhost:5002/health");
        assert_eq!(json["Check"]["Interval"], "10000ms");
    }
}
