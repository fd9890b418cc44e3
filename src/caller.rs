//! Caller identity as forwarded by the upstream auth layer.
//!
//! Token verification happens before traffic reaches these services; they only read the
//! `x-user-id` / `x-user-role` headers it sets.
//!
//! Service-to-service endpoints take no user at all. They demand the shared secret in
//! `x-internal-token` instead, checked against the [`InternalToken`] extension.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::error::MeshError;

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_USER_ROLE: &str = "x-user-role";
pub const HEADER_USERNAME: &str = "x-username";

pub const HEADER_INTERNAL_TOKEN: &str = "x-internal-token";

pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub role: String,
    pub username: Option<String>,
}

impl Caller {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            username: None,
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    pub fn require_admin(&self) -> Result<(), MeshError> {
        if self.is_privileged() {
            Ok(())
        } else {
            Err(MeshError::Forbidden)
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, MeshError> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let id = read(HEADER_USER_ID).ok_or(MeshError::Unauthorized)?;
        Ok(Self {
            id,
            role: read(HEADER_USER_ROLE).unwrap_or_else(|| "user".to_string()),
            username: read(HEADER_USERNAME),
        })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = MeshError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Caller::from_headers(&parts.headers)
    }
}

/// Secret shared by the services of one deployment.
#[derive(Clone)]
pub struct InternalToken(pub String);

impl std::fmt::Debug for InternalToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InternalToken(***)")
    }
}

/// A peer service that presented the internal token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceCaller;

impl ServiceCaller {
    /// No header is `Unauthorized`; a wrong token, or none configured, is `Forbidden`.
    pub fn verify(headers: &HeaderMap, expected: Option<&InternalToken>) -> Result<Self, MeshError> {
        let presented = headers
            .get(HEADER_INTERNAL_TOKEN)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or(MeshError::Unauthorized)?;

        match expected {
            Some(token) if !token.0.is_empty() && token.0 == presented => Ok(Self),
            _ => Err(MeshError::Forbidden),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ServiceCaller
where
    S: Send + Sync,
{
    type Rejection = MeshError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        ServiceCaller::verify(&parts.headers, parts.extensions.get::<InternalToken>())
    }
}
