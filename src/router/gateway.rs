use axum::Json;
use axum::body::{Body, Bytes};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use chrono::Utc;
use std::sync::Arc;

use super::protocol::{
    GatewayErrorBody, GatewayHealthResponse, GatewayStatus, HEADER_GATEWAY_TIMESTAMP,
    HEADER_POWERED_BY, HealthSummary, POWERED_BY, ServiceHealth,
};
use super::types::{GatewayConfig, RouteTable};
use crate::breaker::circuit::BreakerRegistry;
use crate::directory::discovery::Discovery;
use crate::directory::types::{Endpoint, HealthState};
use crate::error::{MeshError, Result};

/// Headers that describe a single connection and must not be forwarded, plus the ones the
/// forwarding client recomputes.
const SKIPPED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Reverse proxy in front of every service.
///
/// Resolution goes through whichever [`Discovery`] backend the process was composed with. The
/// upstream body is buffered completely before anything is written back, so a failure always
/// produces a single error response and never a truncated one.
pub struct Gateway {
    routes: RouteTable,
    discovery: Arc<dyn Discovery>,
    breakers: Arc<BreakerRegistry>,
    http_client: reqwest::Client,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(
        routes: RouteTable,
        discovery: Arc<dyn Discovery>,
        breakers: Arc<BreakerRegistry>,
        config: GatewayConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            routes,
            discovery,
            breakers,
            http_client: reqwest::Client::new(),
            config,
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn discovery(&self) -> &Arc<dyn Discovery> {
        &self.discovery
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub async fn route(&self, request: Request<Body>) -> Response<Body> {
        let path = request.uri().path().to_string();
        tracing::debug!("Gateway: {} {}", request.method(), path);

        let Some(service) = self.routes.lookup(&path).map(str::to_string) else {
            return MeshError::NotFound(format!("Route {}", path)).into_response();
        };

        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, self.config.body_limit).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return MeshError::BadRequest(format!("Invalid request body: {}", e))
                    .into_response();
            }
        };

        match self.dispatch(&service, &parts, body).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Gateway Error: {} - {}", service, e);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(GatewayErrorBody::from_error(&service, &e)),
                )
                    .into_response()
            }
        }
    }

    async fn dispatch(&self, service: &str, parts: &Parts, body: Bytes) -> Result<Response<Body>> {
        let endpoint = self.discovery.resolve(service).await?;
        let endpoint = &endpoint;

        if self.config.use_breaker {
            let breaker = self.breakers.get(service);
            Ok(breaker
                .call(move || self.forward(service, endpoint, parts, body))
                .await?)
        } else {
            self.forward(service, endpoint, parts, body).await
        }
    }

    async fn forward(
        &self,
        service: &str,
        endpoint: &Endpoint,
        parts: &Parts,
        body: Bytes,
    ) -> Result<Response<Body>> {
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", endpoint.url(), path_and_query);

        let upstream = self
            .http_client
            .request(parts.method.clone(), &url)
            .headers(forwardable(&parts.headers))
            .body(body)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(service, e))?;

        let status = upstream.status();
        let mut headers = forwardable(upstream.headers());
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| self.transport_error(service, e))?;

        headers.insert(HEADER_POWERED_BY, HeaderValue::from_static(POWERED_BY));
        if let Ok(stamp) = HeaderValue::from_str(&Utc::now().to_rfc3339()) {
            headers.insert(HEADER_GATEWAY_TIMESTAMP, stamp);
        }

        tracing::debug!("{} {} -> {} ({})", parts.method, url, status, service);

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    fn transport_error(&self, service: &str, err: reqwest::Error) -> MeshError {
        if err.is_timeout() {
            MeshError::UpstreamTimeout {
                service: service.to_string(),
                timeout_ms: self.config.request_timeout.as_millis() as u64,
            }
        } else {
            MeshError::Upstream {
                service: service.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Aggregate health over every service discovery knows about.
    pub async fn health(&self) -> Result<GatewayHealthResponse> {
        let services: Vec<ServiceHealth> = self
            .discovery
            .services()
            .await?
            .into_iter()
            .map(|view| ServiceHealth {
                healthy: view.status == HealthState::Healthy,
                service: view.name,
                status: view.status,
                instances: view.instances,
            })
            .collect();

        let summary = HealthSummary::from_services(&services);

        Ok(GatewayHealthResponse {
            gateway: GatewayStatus {
                status: "ok".to_string(),
                service: self.config.service_name.clone(),
                backend: self.discovery.backend().to_string(),
                timestamp: Utc::now(),
            },
            services,
            summary,
            breakers: self.breakers.snapshot(),
        })
    }
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !SKIPPED_HEADERS.contains(&name.as_str()) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}
