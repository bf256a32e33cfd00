//! Shared vendor status types and HTTP helpers.
use anyhow::{Context, Result};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::store::models::{Provider, ResultRef};
use crate::util::text::truncate_chars;

/// Maximum number of characters kept from an error body.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Classified answer of a vendor status lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorStatus {
    /// Rendering is still in progress.
    StillPending,
    /// Rendering finished with a playable URL.
    Done { result_url: String },
    /// The vendor reported a terminal failure.
    Error { message: String },
}

/// A failed vendor call. Every variant is transient and leaves the job pending.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("{provider} request timed out")]
    Timeout { provider: Provider },
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: Provider,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned error status {status}: {body}")]
    Status {
        provider: Provider,
        status: u16,
        body: String,
    },
    #[error("{provider} returned a malformed payload: {detail}")]
    Malformed { provider: Provider, detail: String },
    #[error("invalid {provider} request: {detail}")]
    InvalidRequest { provider: Provider, detail: String },
}

impl VendorError {
    #[must_use]
    pub fn provider(&self) -> Provider {
        match self {
            VendorError::Timeout { provider }
            | VendorError::Transport { provider, .. }
            | VendorError::Status { provider, .. }
            | VendorError::Malformed { provider, .. }
            | VendorError::InvalidRequest { provider, .. } => *provider,
        }
    }

    /// Whether the call timed out, used to classify summary issues.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, VendorError::Timeout { .. })
    }
}

/// Appends a trailing slash so `join` extends the base path instead of replacing it.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized).with_context(|| format!("invalid base URL: {raw}"))
}

/// Builds `collection/{task_id}`, escaping the task id as a single path segment.
pub(crate) fn task_url(
    provider: Provider,
    base_url: &Url,
    collection: &str,
    task_id: &str,
) -> Result<Url, VendorError> {
    let invalid = |detail: String| VendorError::InvalidRequest { provider, detail };

    if task_id.trim().is_empty() {
        return Err(invalid("empty task id".to_string()));
    }

    let mut url = base_url
        .join(collection)
        .map_err(|error| invalid(format!("failed to build status URL: {error}")))?;
    url.path_segments_mut()
        .map_err(|()| invalid("base URL cannot carry a path".to_string()))?
        .pop_if_empty()
        .push(task_id.trim());
    Ok(url)
}

/// Accepts a vendor result URL only when it reads as a resolved video URL.
///
/// Blank values and `pending:` placeholders are malformed, so the job stays pending.
pub(crate) fn resolved_result(provider: Provider, raw: &str) -> Result<VendorStatus, VendorError> {
    match ResultRef::parse(Some(raw)) {
        ResultRef::Resolved(result_url) => Ok(VendorStatus::Done { result_url }),
        ResultRef::Unset => Err(VendorError::Malformed {
            provider,
            detail: "result URL is blank".to_string(),
        }),
        ResultRef::Pending(_) => Err(VendorError::Malformed {
            provider,
            detail: format!("result URL is an unresolved placeholder: {}", raw.trim()),
        }),
    }
}

/// Sends the request and deserializes a 2xx JSON body.
///
/// # Errors
/// Maps transport failures, timeouts, non-2xx statuses and undecodable bodies to [`VendorError`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: Provider,
    request: RequestBuilder,
) -> Result<T, VendorError> {
    let response = request.send().await.map_err(|source| {
        if source.is_timeout() {
            VendorError::Timeout { provider }
        } else {
            VendorError::Transport { provider, source }
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(VendorError::Status {
            provider,
            status: status.as_u16(),
            body: truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS),
        });
    }

    let bytes = response.bytes().await.map_err(|source| {
        if source.is_timeout() {
            VendorError::Timeout { provider }
        } else {
            VendorError::Transport { provider, source }
        }
    })?;

    serde_json::from_slice(&bytes).map_err(|error| VendorError::Malformed {
        provider,
        detail: error.to_string(),
    })
}
