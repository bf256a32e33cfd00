use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of the placeholder written into `video_url` while a render is in flight.
pub const PENDING_SENTINEL_PREFIX: &str = "pending:";

/// Lifecycle status of a promo video job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Complete,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(JobStatus::Pending),
            "complete" | "completed" => Some(JobStatus::Complete),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl AsRef<str> for JobStatus {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Video synthesis vendor that owns a job's external task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "d-id")]
    DId,
    #[serde(rename = "runway")]
    Runway,
}

impl Provider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::DId => "d-id",
            Provider::Runway => "runway",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "d-id" | "did" | "d_id" => Some(Provider::DId),
            "runway" | "runwayml" => Some(Provider::Runway),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed view of the `video_url` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultRef {
    /// NULL or blank.
    Unset,
    /// `pending:<reason>` placeholder.
    Pending(String),
    /// A playable video URL.
    Resolved(String),
}

impl ResultRef {
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(value) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return ResultRef::Unset;
        };
        match value.strip_prefix(PENDING_SENTINEL_PREFIX) {
            Some(reason) => ResultRef::Pending(reason.to_string()),
            None => ResultRef::Resolved(value.to_string()),
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResultRef::Resolved(_))
    }
}

/// One row of the `jobs` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub business_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub provider: Option<Provider>,
    pub provider_task_id: Option<String>,
    pub video_url: Option<String>,
    pub error: Option<String>,
}

impl Job {
    /// Builds a freshly submitted job as the submission path stores it.
    #[must_use]
    pub fn new_pending(
        business_name: impl Into<String>,
        provider: Option<Provider>,
        provider_task_id: impl Into<String>,
        video_url: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            business_name: business_name.into(),
            created_at: Utc::now(),
            updated_at: None,
            status: JobStatus::Pending,
            provider,
            provider_task_id: Some(provider_task_id.into()),
            video_url,
            error: None,
        }
    }

    #[must_use]
    pub fn result_ref(&self) -> ResultRef {
        ResultRef::parse(self.video_url.as_deref())
    }

    /// Task reference with surrounding whitespace removed, `None` when blank.
    #[must_use]
    pub fn task_ref(&self) -> Option<&str> {
        self.provider_task_id
            .as_deref()
            .map(str::trim)
            .filter(|task| !task.is_empty())
    }

    /// Whether the reconciler should look at this row at all.
    #[must_use]
    pub fn is_reconcile_candidate(&self) -> bool {
        self.status == JobStatus::Pending && !self.result_ref().is_resolved() && self.task_ref().is_some()
    }

    /// Resolves which vendor owns the job.
    ///
    /// An explicit `provider` column wins. Legacy rows without one are Runway when the
    /// sentinel reads `pending:runway*` and D-ID otherwise.
    #[must_use]
    pub fn resolve_provider(&self) -> Provider {
        if let Some(provider) = self.provider {
            return provider;
        }
        if let ResultRef::Pending(reason) = self.result_ref() {
            if reason.to_ascii_lowercase().starts_with("runway") {
                return Provider::Runway;
            }
        }
        Provider::DId
    }
}

/// Keyset position of the pending scan: `(created_at, id)` of the last row seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl From<&Job> for PageCursor {
    fn from(job: &Job) -> Self {
        Self {
            created_at: job.created_at,
            id: job.id,
        }
    }
}
