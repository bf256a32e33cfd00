//! Pending job reconciliation.
//!
//! A run scans the store for pending jobs page by page, asks each job's vendor for the
//! current task status with bounded parallelism, and converges the row with a conditional
//! write. Per-job problems are collected in the [`ReconcileSummary`]; only a store read
//! failure aborts the run.
pub mod summary;

use std::{collections::HashSet, num::NonZeroUsize, sync::Arc, time::Duration};

use anyhow::Context;
use chrono::Utc;
use futures::{StreamExt, stream};
use thiserror::Error;
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub use summary::{IssueKind, JobIssue, ReconcileSummary};
use summary::JobOutcome;

use crate::clients::{VendorRegistry, VendorStatus};
use crate::config::Config;
use crate::observability::Metrics;
use crate::store::{Job, JobStore, PageCursor, ResultRef};

/// Error message written to jobs failed by the expiry policy.
pub const EXPIRED_MESSAGE: &str = "video generation timed out";

/// Tuning knobs of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    pub concurrency: NonZeroUsize,
    pub page_size: NonZeroUsize,
    pub vendor_timeout: Duration,
    /// Pending jobs older than this are failed before the scan. `None` disables expiry.
    pub pending_ttl: Option<Duration>,
}

impl ReconcilerSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.reconcile_concurrency(),
            page_size: config.reconcile_page_size(),
            vendor_timeout: config.vendor_call_timeout(),
            pending_ttl: config.pending_ttl(),
        }
    }
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            concurrency: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
            page_size: NonZeroUsize::new(100).unwrap_or(NonZeroUsize::MIN),
            vendor_timeout: Duration::from_secs(10),
            pending_ttl: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("a reconciliation run is already in progress")]
    AlreadyRunning,
    #[error("failed to scan pending jobs: {source:#}")]
    Scan {
        /// Counts of the work completed before the scan failed.
        partial: Box<ReconcileSummary>,
        #[source]
        source: anyhow::Error,
    },
}

impl ReconcileError {
    #[must_use]
    pub fn partial(&self) -> Option<&ReconcileSummary> {
        match self {
            ReconcileError::AlreadyRunning => None,
            ReconcileError::Scan { partial, .. } => Some(partial),
        }
    }
}

/// リコンサイラ本体。実行間で状態を持たず、すべての状態はストアにある。
pub struct Reconciler {
    store: Arc<dyn JobStore>,
    vendors: VendorRegistry,
    settings: ReconcilerSettings,
    metrics: Arc<Metrics>,
    run_lock: Mutex<()>,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        vendors: VendorRegistry,
        settings: ReconcilerSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            vendors,
            settings,
            metrics,
            run_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    #[must_use]
    pub fn vendors(&self) -> &VendorRegistry {
        &self.vendors
    }

    /// Whether a run currently holds the single-flight guard.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// 保留中のジョブをベンダーの状態に合わせて更新する。
    ///
    /// 各ジョブは1回の実行で高々1回だけ更新される。ジョブ単位の失敗はサマリーに記録され、
    /// 他のジョブの処理は継続する。
    ///
    /// # Errors
    /// 別の実行が進行中なら [`ReconcileError::AlreadyRunning`]、保留ジョブの読み出しに
    /// 失敗した場合はそれまでのサマリーを添えた [`ReconcileError::Scan`] を返す。
    #[instrument(skip_all, name = "reconcile_pending_jobs")]
    pub async fn reconcile_pending_jobs(&self) -> Result<ReconcileSummary, ReconcileError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            self.metrics.runs_rejected.inc();
            warn!("reconciliation already in progress, rejecting trigger");
            return Err(ReconcileError::AlreadyRunning);
        };

        self.metrics.runs_total.inc();
        let timer = self.metrics.run_duration.start_timer();
        let mut summary = ReconcileSummary::started(Utc::now());
        info!(
            concurrency = self.settings.concurrency.get(),
            page_size = self.settings.page_size.get(),
            providers = ?self.vendors.providers(),
            "reconciliation started"
        );

        let scanned = self.scan(&mut summary).await;
        summary.finish(Utc::now());
        timer.observe_duration();
        #[allow(clippy::cast_precision_loss)]
        self.metrics.pending_candidates.set(summary.candidates as f64);

        match scanned {
            Ok(()) => {
                info!(
                    candidates = summary.candidates,
                    checked = summary.checked,
                    completed = summary.completed,
                    failed = summary.failed,
                    unchanged = summary.unchanged,
                    transient_errors = summary.transient_errors,
                    write_errors = summary.write_errors,
                    skipped = summary.skipped,
                    unavailable = summary.unavailable,
                    expired = summary.expired,
                    "reconciliation finished"
                );
                Ok(summary)
            }
            Err(source) => {
                self.metrics.runs_failed.inc();
                error!(
                    error = %format!("{source:#}"),
                    candidates = summary.candidates,
                    checked = summary.checked,
                    "reconciliation aborted by store read failure"
                );
                Err(ReconcileError::Scan {
                    partial: Box::new(summary),
                    source,
                })
            }
        }
    }

    async fn scan(&self, summary: &mut ReconcileSummary) -> anyhow::Result<()> {
        self.expire_stale(summary).await;

        let page_size = self.settings.page_size.get();
        let mut cursor: Option<PageCursor> = None;
        let mut seen: HashSet<Uuid> = HashSet::new();

        loop {
            let page = self
                .store
                .fetch_pending(cursor.as_ref(), page_size)
                .await
                .context("failed to fetch pending jobs")?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(PageCursor::from(last));
            let fetched = page.len();

            let jobs: Vec<Job> = page.into_iter().filter(|job| seen.insert(job.id)).collect();
            summary.candidates += jobs.len();
            debug!(fetched, fresh = jobs.len(), "scanned pending page");

            let lookups: Vec<_> = jobs.into_iter().map(|job| self.reconcile_job(job)).collect();
            let outcomes: Vec<JobOutcome> = stream::iter(lookups)
                .buffer_unordered(self.settings.concurrency.get())
                .collect()
                .await;
            for outcome in outcomes {
                summary.record(outcome);
            }

            if fetched < page_size {
                break;
            }
        }

        Ok(())
    }

    async fn expire_stale(&self, summary: &mut ReconcileSummary) {
        let Some(ttl) = self.settings.pending_ttl else {
            return;
        };
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            warn!(?ttl, "pending TTL out of range, skipping expiry");
            return;
        };
        let cutoff = Utc::now() - ttl;

        match self.store.expire_pending_before(cutoff, EXPIRED_MESSAGE).await {
            Ok(expired) => {
                for job_id in &expired {
                    info!(%job_id, cutoff = %cutoff, "expired stale pending job");
                }
                #[allow(clippy::cast_precision_loss)]
                self.metrics.jobs_expired.inc_by(expired.len() as f64);
                summary.expired += expired.len();
            }
            Err(e) => {
                self.metrics.store_write_errors.inc();
                warn!(error = %format!("{e:#}"), "failed to expire stale pending jobs");
                summary.record_expiry_failure(JobIssue::new(
                    None,
                    IssueKind::Expiry,
                    format!("failed to expire stale pending jobs: {e:#}"),
                ));
            }
        }
    }

    async fn reconcile_job(&self, job: Job) -> JobOutcome {
        let job_id = job.id;
        let provider = job.resolve_provider();
        let Some(task_id) = job.task_ref() else {
            return JobOutcome::Unchanged;
        };

        let Some(client) = self.vendors.get(provider) else {
            warn!(%job_id, %provider, "no status client configured, leaving job pending");
            return JobOutcome::Unavailable(JobIssue::new(
                Some(job_id),
                IssueKind::ProviderUnavailable,
                format!("no status client configured for {provider}"),
            ));
        };

        let timer = self.metrics.vendor_lookup_duration.start_timer();
        let lookup = timeout(self.settings.vendor_timeout, client.fetch_status(task_id)).await;
        timer.observe_duration();

        let status = match lookup {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                self.metrics.vendor_transient_errors.inc();
                warn!(%job_id, %provider, task_id, error = %e, "vendor lookup failed, job stays pending");
                let kind = if e.is_timeout() {
                    IssueKind::VendorTimeout
                } else {
                    IssueKind::VendorError
                };
                return JobOutcome::LookupFailed(JobIssue::new(Some(job_id), kind, e.to_string()));
            }
            Err(_) => {
                self.metrics.vendor_transient_errors.inc();
                let timeout_ms = u64::try_from(self.settings.vendor_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(%job_id, %provider, task_id, timeout_ms, "vendor lookup timed out, job stays pending");
                return JobOutcome::LookupFailed(JobIssue::new(
                    Some(job_id),
                    IssueKind::VendorTimeout,
                    format!("{provider} lookup exceeded {timeout_ms} ms"),
                ));
            }
        };

        match status {
            VendorStatus::StillPending => {
                debug!(%job_id, %provider, task_id, "vendor reports job still pending");
                JobOutcome::Unchanged
            }
            VendorStatus::Done { result_url } => {
                let ResultRef::Resolved(result_url) = ResultRef::parse(Some(result_url.as_str())) else {
                    self.metrics.vendor_transient_errors.inc();
                    warn!(%job_id, %provider, task_id, result_url = %result_url, "vendor reported an unresolved result URL, job stays pending");
                    return JobOutcome::LookupFailed(JobIssue::new(
                        Some(job_id),
                        IssueKind::VendorError,
                        format!("{provider} reported an unresolved result URL: {result_url}"),
                    ));
                };
                match self.store.mark_complete(job_id, &result_url).await {
                    Ok(true) => {
                        self.metrics.jobs_completed.inc();
                        info!(%job_id, %provider, video_url = %result_url, "job completed");
                        JobOutcome::Completed
                    }
                    Ok(false) => self.skipped(job_id),
                    Err(e) => self.write_failed(job_id, &e),
                }
            }
            VendorStatus::Error { message } => match self.store.mark_failed(job_id, &message).await {
                Ok(true) => {
                    self.metrics.jobs_failed.inc();
                    info!(%job_id, %provider, error = %message, "job failed at vendor");
                    JobOutcome::Failed
                }
                Ok(false) => self.skipped(job_id),
                Err(e) => self.write_failed(job_id, &e),
            },
        }
    }

    fn skipped(&self, job_id: Uuid) -> JobOutcome {
        self.metrics.jobs_skipped.inc();
        debug!(%job_id, "job left pending before the update, skipping");
        JobOutcome::Skipped
    }

    fn write_failed(&self, job_id: Uuid, e: &anyhow::Error) -> JobOutcome {
        self.metrics.store_write_errors.inc();
        warn!(%job_id, error = %format!("{e:#}"), "failed to update job, will retry next run");
        JobOutcome::WriteFailed(JobIssue::new(
            Some(job_id),
            IssueKind::StoreWrite,
            format!("{e:#}"),
        ))
    }
}
