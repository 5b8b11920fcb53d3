use reqwest::{header, Url};
use serde::{Deserialize, Serialize};

use super::{base_url, endpoint, http_client, SetupError};
use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningResponse {
    #[serde(default)]
    pub provisioning_token: String,
}

#[async_trait::async_trait]
pub trait Provisioner: Send + Sync {
    async fn provisioning_token(
        &self,
        device_id: &str,
        authorization: Option<&str>,
    ) -> Result<ProvisioningResponse, ServiceError>;
}

/// Exchanges a device id for a provisioning token with the remote
/// provisioning service.
#[derive(Clone)]
pub struct HttpProvisioner {
    http: reqwest::Client,
    api_url: Option<Url>,
}

impl HttpProvisioner {
    pub fn new(api_url: Option<String>, timeout_ms: u64) -> Result<Self, SetupError> {
        let api_url = match api_url.as_deref() {
            Some(raw) if !raw.is_empty() => Some(base_url(raw)?),
            _ => None,
        };
        Ok(Self {
            http: http_client(timeout_ms)?,
            api_url,
        })
    }
}

#[async_trait::async_trait]
impl Provisioner for HttpProvisioner {
    async fn provisioning_token(
        &self,
        device_id: &str,
        authorization: Option<&str>,
    ) -> Result<ProvisioningResponse, ServiceError> {
        let api_url = self
            .api_url
            .as_ref()
            .ok_or_else(|| ServiceError::Internal("provisioning service is not configured".to_string()))?;

        let url = endpoint(api_url, "devices/provisioning", device_id)
            .map_err(|e| ServiceError::InvalidFormat(e.to_string()))?;
        let mut req = self.http.get(url.clone());
        if let Some(token) = authorization {
            req = req.header(header::AUTHORIZATION, token);
        }

        let resp = req.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "provisioning request failed");
            ServiceError::Internal(format!("provisioning service unreachable: {e}"))
        })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ServiceError::Internal(format!("reading provisioning response: {e}")))?;

        if !status.is_success() {
            tracing::warn!(device_id = %device_id, status = status.as_u16(), "provisioning rejected");
            return Err(ServiceError::Upstream {
                status: status.as_u16(),
                message: body,
            });
        }

        parse_provisioning_response(&body)
    }
}

pub fn parse_provisioning_response(body: &str) -> Result<ProvisioningResponse, ServiceError> {
    let parsed: ProvisioningResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::Internal(format!("invalid provisioning response: {e}")))?;

    if parsed.provisioning_token.is_empty() {
        return Err(ServiceError::Internal("provisioning service returned an empty token".to_string()));
    }
    Ok(parsed)
}
