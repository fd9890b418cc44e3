//! Discovery and registration seams.
//!
//! The router only needs `resolve`; whether the answer comes from the in-process
//! [`ServiceDirectory`] or from an external registrar is decided at composition time.

use async_trait::async_trait;

use super::protocol::{ENDPOINT_REGISTRY, RegisterResponse};
use super::service::ServiceDirectory;
use super::types::{Endpoint, ServiceRegistration, ServiceView};
use crate::error::{MeshError, Result};

#[async_trait]
pub trait Discovery: Send + Sync {
    /// One live endpoint for `service`, or `ServiceUnavailable`.
    async fn resolve(&self, service: &str) -> Result<Endpoint>;

    /// Every known service with its current health.
    async fn services(&self) -> Result<Vec<ServiceView>>;

    fn backend(&self) -> &'static str;
}

#[async_trait]
impl Discovery for ServiceDirectory {
    async fn resolve(&self, service: &str) -> Result<Endpoint> {
        ServiceDirectory::resolve(self, service)
    }

    async fn services(&self) -> Result<Vec<ServiceView>> {
        let self_name = self.config().self_name.clone();
        Ok(self
            .snapshot()
            .iter()
            .filter(|entry| Some(&entry.name) != self_name.as_ref())
            .map(ServiceView::from)
            .collect())
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

/// Announces a service instance to whatever backs discovery.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, registration: &ServiceRegistration) -> Result<()>;

    async fn deregister(&self, registration: &ServiceRegistration) -> Result<()>;
}

/// Registers against a gateway's `/registry` endpoint.
pub struct GatewayRegistrar {
    gateway_url: String,
    http_client: reqwest::Client,
}

impl GatewayRegistrar {
    pub fn new(gateway_url: &str) -> Self {
        Self {
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    fn upstream_error(&self, reason: impl ToString) -> MeshError {
        MeshError::Upstream {
            service: "api-gateway".to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Registrar for GatewayRegistrar {
    async fn register(&self, registration: &ServiceRegistration) -> Result<()> {
        let url = format!("{}{}", self.gateway_url, ENDPOINT_REGISTRY);
        let response = self
            .http_client
            .post(&url)
            .json(registration)
            .timeout(std::time::Duration::from_secs(3))
            .send()
            .await
            .map_err(|e| self.upstream_error(e))?;

        if !response.status().is_success() {
            return Err(self.upstream_error(format!("register returned {}", response.status())));
        }

        let body: RegisterResponse = response.json().await.map_err(|e| self.upstream_error(e))?;
        tracing::info!(
            "Registered {} with gateway {} (success={})",
            registration.name,
            self.gateway_url,
            body.success
        );
        Ok(())
    }

    async fn deregister(&self, registration: &ServiceRegistration) -> Result<()> {
        let mut url = reqwest::Url::parse(&format!("{}{}", self.gateway_url, ENDPOINT_REGISTRY))
            .map_err(|e| self.upstream_error(e))?;
        url.path_segments_mut()
            .map_err(|_| self.upstream_error("gateway url cannot carry a path"))?
            .push(&registration.name);
        url.query_pairs_mut()
            .append_pair("address", &registration.address)
            .append_pair("port", &registration.port.to_string());

        let response = self
            .http_client
            .delete(url)
            .timeout(std::time::Duration::from_secs(3))
            .send()
            .await
            .map_err(|e| self.upstream_error(e))?;

        if !response.status().is_success() {
            return Err(self.upstream_error(format!(
                "deregister returned {}",
                response.status()
            )));
        }

        tracing::info!("Deregistered {} from gateway", registration.name);
        Ok(())
    }
}
