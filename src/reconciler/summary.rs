use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Category of a per-job problem recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    VendorTimeout,
    VendorError,
    ProviderUnavailable,
    StoreWrite,
    Expiry,
}

/// A problem that left one job (or the expiry sweep) unresolved this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobIssue {
    /// `None` for problems that are not tied to a single job.
    pub job_id: Option<Uuid>,
    pub kind: IssueKind,
    pub message: String,
}

impl JobIssue {
    #[must_use]
    pub fn new(job_id: Option<Uuid>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            job_id,
            kind,
            message: message.into(),
        }
    }
}

/// Result of reconciling a single job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Completed,
    Failed,
    Unchanged,
    /// The vendor answered but the row had already left `pending`.
    Skipped,
    WriteFailed(JobIssue),
    LookupFailed(JobIssue),
    Unavailable(JobIssue),
}

/// Aggregate counts of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub candidates: usize,
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub unchanged: usize,
    pub transient_errors: usize,
    pub write_errors: usize,
    pub skipped: usize,
    pub unavailable: usize,
    pub expired: usize,
    pub issues: Vec<JobIssue>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ReconcileSummary {
    #[must_use]
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            candidates: 0,
            checked: 0,
            completed: 0,
            failed: 0,
            unchanged: 0,
            transient_errors: 0,
            write_errors: 0,
            skipped: 0,
            unavailable: 0,
            expired: 0,
            issues: Vec::new(),
            started_at: at,
            finished_at: None,
        }
    }

    pub(crate) fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = Some(at);
    }

    pub(crate) fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Completed => {
                self.checked += 1;
                self.completed += 1;
            }
            JobOutcome::Failed => {
                self.checked += 1;
                self.failed += 1;
            }
            JobOutcome::Unchanged => {
                self.checked += 1;
                self.unchanged += 1;
            }
            JobOutcome::Skipped => {
                self.checked += 1;
                self.skipped += 1;
            }
            JobOutcome::WriteFailed(issue) => {
                self.checked += 1;
                self.write_errors += 1;
                self.issues.push(issue);
            }
            JobOutcome::LookupFailed(issue) => {
                self.transient_errors += 1;
                self.issues.push(issue);
            }
            JobOutcome::Unavailable(issue) => {
                self.unavailable += 1;
                self.issues.push(issue);
            }
        }
    }

    pub(crate) fn record_expiry_failure(&mut self, issue: JobIssue) {
        self.write_errors += 1;
        self.issues.push(issue);
    }

    /// Rows whose stored state changed this run.
    #[must_use]
    pub fn updated(&self) -> usize {
        self.completed + self.failed + self.expired
    }
}
