use std::fmt;

use reqwest::{header, Url};
use serde::Deserialize;

use super::{base_url, endpoint, http_client, SetupError};
use crate::error::ServiceError;

/// What the caller wants to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessCheck {
    /// Read data of a device.
    Device,
    /// Read data of a location.
    Location,
    /// Write data on behalf of a device.
    DeviceRights,
}

impl AccessCheck {
    fn path(self) -> &'static str {
        match self {
            Self::Device => "check-device-access",
            Self::Location => "check-location-access",
            Self::DeviceRights => "devices/check-device-rights",
        }
    }
}

impl fmt::Display for AccessCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Device => "device",
            Self::Location => "location",
            Self::DeviceRights => "device rights",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingCredentials,
    #[error("access denied: {check} '{id}'")]
    Denied { check: AccessCheck, id: String },
    #[error("authorization service unreachable: {0}")]
    Unreachable(String),
    #[error(transparent)]
    InvalidTarget(#[from] super::InvalidIdentifier),
}

impl From<AuthError> for ServiceError {
    fn from(e: AuthError) -> Self {
        metrics::counter!("auth_denied_total").increment(1);
        ServiceError::PermissionDenied(e.to_string())
    }
}

#[async_trait::async_trait]
pub trait AccessControl: Send + Sync {
    /// `Ok(())` only when the collaborator explicitly allowed the access.
    async fn check(&self, check: AccessCheck, id: &str, authorization: Option<&str>) -> Result<(), AuthError>;
}

/// Grants everything. Used when authorization is disabled in config.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait::async_trait]
impl AccessControl for AllowAll {
    async fn check(&self, _check: AccessCheck, _id: &str, _authorization: Option<&str>) -> Result<(), AuthError> {
        Ok(())
    }
}

#[derive(Deserialize)]
struct AccessResponse {
    allowed: bool,
}

/// Interpret an authorization response body: JSON `{"allowed": bool}`,
/// or the plain-text `Access granted` sentinel.
pub fn parse_access_response(body: &str) -> bool {
    match serde_json::from_str::<AccessResponse>(body) {
        Ok(r) => r.allowed,
        Err(_) => body.contains("Access granted"),
    }
}

#[derive(Clone)]
pub struct HttpAccessControl {
    http: reqwest::Client,
    api_url: Url,
}

impl HttpAccessControl {
    pub fn new(api_url: &str, timeout_ms: u64) -> Result<Self, SetupError> {
        Ok(Self {
            http: http_client(timeout_ms)?,
            api_url: base_url(api_url)?,
        })
    }
}

#[async_trait::async_trait]
impl AccessControl for HttpAccessControl {
    async fn check(&self, check: AccessCheck, id: &str, authorization: Option<&str>) -> Result<(), AuthError> {
        let token = authorization
            .filter(|t| !t.trim().is_empty())
            .ok_or(AuthError::MissingCredentials)?;

        let url = endpoint(&self.api_url, check.path(), id)?;
        let resp = self
            .http
            .get(url.clone())
            .header(header::AUTHORIZATION, token)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %url, error = %e, "authorization request failed");
                AuthError::Unreachable(e.to_string())
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| AuthError::Unreachable(e.to_string()))?;

        if status.is_success() && parse_access_response(&body) {
            return Ok(());
        }

        tracing::info!(%check, id = %id, status = status.as_u16(), "access denied");
        Err(AuthError::Denied {
            check,
            id: id.to_string(),
        })
    }
}
