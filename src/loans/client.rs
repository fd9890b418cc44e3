//! Outbound calls from the loans role to the catalog and identity services.
//!
//! Calls go through the gateway by default, or straight to an endpoint resolved by discovery.
//! Only transport failures feed the per-service breaker; an HTTP answer, even a `409`, is a
//! working dependency.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::types::UserProfile;
use crate::breaker::circuit::BreakerRegistry;
use crate::breaker::types::BreakerError;
use crate::caller::HEADER_INTERNAL_TOKEN;
use crate::directory::discovery::Discovery;
use crate::error::{
    CODE_CEILING_EXCEEDED, CODE_CIRCUIT_OPEN, CODE_NOT_AVAILABLE, ErrorEnvelope, MeshError, Result,
};
use crate::inventory::protocol::{UnitsRequest, UnitsResponse};
use crate::inventory::store::InventoryHolder;
use crate::inventory::types::InventoryItem;

pub const CATALOG_SERVICE: &str = "catalog-service";
pub const USER_SERVICE: &str = "user-service";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// How a service name becomes a base URL.
#[derive(Clone)]
pub enum Upstream {
    /// Every call goes through the gateway, which routes on the path prefix.
    Gateway(String),
    /// Calls go directly to an endpoint resolved per call.
    Discovery(Arc<dyn Discovery>),
}

pub struct ServiceClient {
    upstream: Upstream,
    http_client: reqwest::Client,
    timeout: Duration,
    breakers: Option<Arc<BreakerRegistry>>,
    internal_token: Option<String>,
}

impl ServiceClient {
    pub fn new(upstream: Upstream) -> Self {
        Self {
            upstream,
            http_client: reqwest::Client::new(),
            timeout: DEFAULT_TIMEOUT,
            breakers: None,
            internal_token: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_breakers(mut self, breakers: Arc<BreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    /// Token sent as `x-internal-token` so the catalog accepts unit adjustments.
    pub fn with_internal_token(mut self, token: impl Into<String>) -> Self {
        self.internal_token = Some(token.into());
        self
    }

    async fn base_url(&self, service: &str) -> Result<String> {
        match &self.upstream {
            Upstream::Gateway(url) => Ok(url.trim_end_matches('/').to_string()),
            Upstream::Discovery(discovery) => Ok(discovery.resolve(service).await?.url()),
        }
    }

    /// `segments` are percent-encoded one by one, so an id can never add a path segment or a
    /// query of its own.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        service: &str,
        segments: &[&str],
    ) -> Result<T> {
        self.request::<(), T>(service, Method::GET, segments, None).await
    }

    pub async fn put_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        service: &str,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        self.request(service, Method::PUT, segments, Some(body)).await
    }

    async fn request<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        service: &str,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T> {
        let url = endpoint_url(&self.base_url(service).await?, segments).map_err(|reason| {
            MeshError::Upstream {
                service: service.to_string(),
                reason,
            }
        })?;
        let http_client = &self.http_client;
        let timeout = self.timeout;
        let internal_token = self.internal_token.as_deref();

        let send = move || async move {
            let mut request = http_client.request(method, url).timeout(timeout);
            if let Some(token) = internal_token {
                request = request.header(HEADER_INTERNAL_TOKEN, token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            request.send().await
        };

        let response = match &self.breakers {
            Some(breakers) => breakers
                .get(service)
                .call(send)
                .await
                .map_err(|e| match e {
                    BreakerError::Open { name, .. } => MeshError::CircuitOpen { service: name },
                    BreakerError::Inner(e) => self.transport_error(service, e),
                })?,
            None => send()
                .await
                .map_err(|e| self.transport_error(service, e))?,
        };

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| MeshError::Upstream {
                service: service.to_string(),
                reason: format!("invalid response body: {}", e),
            });
        }

        let envelope = response.json::<ErrorEnvelope>().await.ok();
        Err(error_from_response(service, status, envelope))
    }

    fn transport_error(&self, service: &str, err: reqwest::Error) -> MeshError {
        if err.is_timeout() {
            MeshError::UpstreamTimeout {
                service: service.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            MeshError::Upstream {
                service: service.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

fn endpoint_url(base: &str, segments: &[&str]) -> std::result::Result<reqwest::Url, String> {
    let mut url =
        reqwest::Url::parse(base).map_err(|e| format!("invalid base url {}: {}", base, e))?;
    url.path_segments_mut()
        .map_err(|_| format!("base url {} cannot carry a path", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Maps an error answer back onto the taxonomy, branching on `code` before status.
fn error_from_response(
    service: &str,
    status: StatusCode,
    envelope: Option<ErrorEnvelope>,
) -> MeshError {
    let code = envelope.as_ref().and_then(|e| e.code.as_deref());
    let message = envelope
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| format!("status {}", status));

    match (code, status) {
        (Some(CODE_NOT_AVAILABLE), _) => MeshError::NotAvailable,
        (Some(CODE_CEILING_EXCEEDED), _) => MeshError::CeilingExceeded,
        (Some(CODE_CIRCUIT_OPEN), _) => MeshError::CircuitOpen {
            service: service.to_string(),
        },
        (_, StatusCode::NOT_FOUND) => MeshError::NotFound(match service {
            CATALOG_SERVICE => "Item".to_string(),
            USER_SERVICE => "User".to_string(),
            other => other.to_string(),
        }),
        (_, StatusCode::BAD_REQUEST) => MeshError::InvalidState(message),
        _ => MeshError::Upstream {
            service: service.to_string(),
            reason: message,
        },
    }
}

/// The catalog's unit counters, reached over HTTP.
pub struct RemoteInventory {
    client: Arc<ServiceClient>,
}

impl RemoteInventory {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InventoryHolder for RemoteInventory {
    async fn get_item(&self, id: &str) -> Result<InventoryItem> {
        self.client
            .get_json(CATALOG_SERVICE, &["items", id])
            .await
    }

    async fn adjust_units(&self, id: &str, delta: i64, conditional: bool) -> Result<InventoryItem> {
        let response: UnitsResponse = self
            .client
            .put_json(
                CATALOG_SERVICE,
                &["items", id, "units"],
                &UnitsRequest { delta, conditional },
            )
            .await?;
        Ok(response.item)
    }
}

/// Looks users up by id.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn lookup(&self, user_id: &str) -> Result<UserProfile>;
}

pub struct HttpIdentity {
    client: Arc<ServiceClient>,
}

impl HttpIdentity {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityDirectory for HttpIdentity {
    async fn lookup(&self, user_id: &str) -> Result<UserProfile> {
        self.client
            .get_json(USER_SERVICE, &["users", user_id])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(code: Option<&str>, message: &str) -> Option<ErrorEnvelope> {
        Some(ErrorEnvelope {
            success: false,
            message: message.to_string(),
            code: code.map(str::to_string),
        })
    }

    #[test]
    fn test_not_available_code_wins_over_status() {
        let err = error_from_response(
            CATALOG_SERVICE,
            StatusCode::CONFLICT,
            envelope(Some("NOT_AVAILABLE"), "Item not available for borrowing"),
        );
        assert_eq!(err, MeshError::NotAvailable);
    }

    #[test]
    fn test_not_found_names_the_entity() {
        let err = error_from_response(CATALOG_SERVICE, StatusCode::NOT_FOUND, None);
        assert_eq!(err, MeshError::NotFound("Item".to_string()));
        assert_eq!(err.to_string(), "Item not found");
    }

    #[test]
    fn test_gateway_failure_is_upstream() {
        let err = error_from_response(
            USER_SERVICE,
            StatusCode::BAD_GATEWAY,
            envelope(None, "Service user-service unavailable"),
        );
        assert!(matches!(err, MeshError::Upstream { ref service, .. } if service == "user-service"));
    }

    #[test]
    fn test_ids_stay_inside_their_segment() {
        let url = endpoint_url("http://gateway:3000", &["items", "a/b?c#d", "units"]).unwrap();
        assert_eq!(url.as_str(), "http://gateway:3000/items/a%2Fb%3Fc%23d/units");
        assert!(url.query().is_none());

        let url = endpoint_url("http://10.0.0.5:5002/", &["users", "u 1"]).unwrap();
        assert_eq!(url.path(), "/users/u%201");
    }

    #[test]
    fn test_unusable_base_url() {
        assert!(endpoint_url("not a url", &["items"]).is_err());
        assert!(endpoint_url("mailto:ops@example.com", &["items"]).is_err());
    }
}
