//! Runway task status client.
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url, header::ACCEPT};
use serde::Deserialize;
use tracing::{debug, warn};

use super::VendorStatusClient;
use super::types::{VendorError, VendorStatus, parse_base_url, resolved_result, send_json, task_url};
use crate::store::models::Provider;
use crate::util::text::sanitize_vendor_message;

pub const DEFAULT_API_VERSION: &str = "2024-11-06";
const VERSION_HEADER: &str = "X-Runway-Version";
const CANCELLED_MESSAGE: &str = "generation was cancelled";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResponse {
    status: String,
    #[serde(default)]
    output: Option<Vec<String>>,
    #[serde(default)]
    failure: Option<String>,
    #[serde(default)]
    failure_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunwayConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_version: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RunwayClient {
    client: Client,
    base_url: Url,
    api_key: String,
    api_version: String,
}

impl RunwayClient {
    /// Builds a Runway client.
    ///
    /// # Errors
    /// Returns an error when the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: RunwayConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build Runway HTTP client")?;

        let base_url = parse_base_url(&config.base_url).context("invalid Runway base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            api_version: config.api_version,
        })
    }
}

#[async_trait]
impl VendorStatusClient for RunwayClient {
    fn provider(&self) -> Provider {
        Provider::Runway
    }

    async fn fetch_status(&self, task_id: &str) -> Result<VendorStatus, VendorError> {
        let url = task_url(Provider::Runway, &self.base_url, "v1/tasks/", task_id)?;
        debug!(%url, "fetching Runway task status");

        let request = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .header(VERSION_HEADER, &self.api_version)
            .header(ACCEPT, "application/json");

        let task: TaskResponse = send_json(Provider::Runway, request).await?;
        classify(task_id, task)
    }
}

fn classify(task_id: &str, task: TaskResponse) -> Result<VendorStatus, VendorError> {
    match task.status.trim().to_ascii_uppercase().as_str() {
        "PENDING" | "THROTTLED" | "RUNNING" => Ok(VendorStatus::StillPending),
        "SUCCEEDED" => {
            let output = task.output.unwrap_or_default();
            match output.iter().find(|url| !url.trim().is_empty()) {
                Some(url) => resolved_result(Provider::Runway, url),
                None => Err(VendorError::Malformed {
                    provider: Provider::Runway,
                    detail: "task succeeded without output".to_string(),
                }),
            }
        }
        "FAILED" => {
            let raw = task
                .failure
                .filter(|text| !text.trim().is_empty())
                .or(task.failure_code)
                .unwrap_or_default();
            Ok(VendorStatus::Error {
                message: sanitize_vendor_message(&raw),
            })
        }
        "CANCELLED" => Ok(VendorStatus::Error {
            message: CANCELLED_MESSAGE.to_string(),
        }),
        other => {
            warn!(task_id, status = other, "unknown Runway task status, treating as pending");
            Ok(VendorStatus::StillPending)
        }
    }
}
