//! Remote services the API consults before touching data: the
//! authorization service and the device-provisioning service. Both are
//! plain fallible HTTP calls; nothing here retries.

pub mod auth;
pub mod provisioning;

use std::time::Duration;

use reqwest::Url;

pub use auth::{AccessCheck, AccessControl, AllowAll, AuthError, HttpAccessControl};
pub use provisioning::{HttpProvisioner, Provisioner, ProvisioningResponse};

#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("invalid collaborator url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("building HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("'{0}' is not a valid identifier")]
pub struct InvalidIdentifier(pub String);

pub(crate) fn http_client(timeout_ms: u64) -> Result<reqwest::Client, SetupError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()?)
}

/// Parse a collaborator base URL; it must be able to carry path segments.
pub(crate) fn base_url(raw: &str) -> Result<Url, SetupError> {
    let url = Url::parse(raw).map_err(|e| SetupError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(SetupError::InvalidUrl {
            url: raw.to_string(),
            reason: "not a hierarchical URL".to_string(),
        });
    }
    Ok(url)
}

/// `{base}/{path}/{id}` with `id` kept as a single percent-encoded segment.
pub(crate) fn endpoint(base: &Url, path: &str, id: &str) -> Result<Url, InvalidIdentifier> {
    if matches!(id, "" | "." | "..") {
        return Err(InvalidIdentifier(id.to_string()));
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| InvalidIdentifier(id.to_string()))?
        .pop_if_empty()
        .extend(path.split('/'))
        .push(id);
    Ok(url)
}
