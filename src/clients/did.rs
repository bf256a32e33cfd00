//! D-ID Talks status client.
//!
//! Calls `GET /talks/{id}` with Basic credentials and classifies the answer as a [`VendorStatus`].
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    Client, Url,
    header::{ACCEPT, AUTHORIZATION},
};
use serde::Deserialize;
use tracing::{debug, warn};

use super::VendorStatusClient;
use super::types::{VendorError, VendorStatus, parse_base_url, resolved_result, send_json, task_url};
use crate::store::models::Provider;
use crate::util::text::sanitize_vendor_message;

/// Fields of a D-ID talk needed to reconcile a job.
#[derive(Debug, Deserialize)]
struct TalkResponse {
    status: String,
    #[serde(default)]
    result_url: Option<String>,
    #[serde(default)]
    error: Option<TalkError>,
}

/// D-ID errors are usually `{kind, description}` objects but sometimes plain strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TalkError {
    Text(String),
    Detail {
        #[serde(default)]
        kind: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

impl TalkError {
    fn message(&self) -> Option<&str> {
        let raw = match self {
            TalkError::Text(text) => Some(text.as_str()),
            TalkError::Detail { kind, description } => description
                .as_deref()
                .filter(|text| !text.trim().is_empty())
                .or(kind.as_deref()),
        };
        raw.filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct DIdConfig {
    pub base_url: String,
    pub api_key: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DIdClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl DIdClient {
    /// Builds a D-ID client.
    ///
    /// # Errors
    /// Returns an error when the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: DIdConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build D-ID HTTP client")?;

        let base_url = parse_base_url(&config.base_url).context("invalid D-ID base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }
}

#[async_trait]
impl VendorStatusClient for DIdClient {
    fn provider(&self) -> Provider {
        Provider::DId
    }

    async fn fetch_status(&self, task_id: &str) -> Result<VendorStatus, VendorError> {
        let url = task_url(Provider::DId, &self.base_url, "talks/", task_id)?;
        debug!(%url, "fetching D-ID talk status");

        let request = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Basic {}", self.api_key))
            .header(ACCEPT, "application/json");

        let talk: TalkResponse = send_json(Provider::DId, request).await?;
        classify(task_id, talk)
    }
}

fn classify(task_id: &str, talk: TalkResponse) -> Result<VendorStatus, VendorError> {
    match talk.status.trim().to_ascii_lowercase().as_str() {
        "created" | "started" => Ok(VendorStatus::StillPending),
        "done" => match talk.result_url.as_deref() {
            Some(url) => resolved_result(Provider::DId, url),
            None => Err(VendorError::Malformed {
                provider: Provider::DId,
                detail: "talk is done but has no result_url".to_string(),
            }),
        },
        "error" | "rejected" => {
            let raw = talk
                .error
                .as_ref()
                .and_then(TalkError::message)
                .unwrap_or_default();
            Ok(VendorStatus::Error {
                message: sanitize_vendor_message(raw),
            })
        }
        other => {
            warn!(task_id, status = other, "unknown D-ID talk status, treating as pending");
            Ok(VendorStatus::StillPending)
        }
    }
}
