//! In-process [`JobStore`] used by tests and local dry runs.
//!
//! Mirrors the conditional-update semantics of the Postgres store and can be told to
//! fail reads or writes so error isolation can be exercised without a database.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Mutex,
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::JobStore;
use super::models::{Job, JobStatus, PageCursor};

#[derive(Debug, Default)]
struct FaultPlan {
    /// Number of successful `fetch_pending` calls before reads start failing.
    reads_before_failure: Option<usize>,
    reads_served: usize,
    failing_writes: HashSet<Uuid>,
    fail_expiry: bool,
    fail_ping: bool,
}

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<BTreeMap<Uuid, Job>>,
    faults: Mutex<FaultPlan>,
}

impl MemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        let store = Self::new();
        for job in jobs {
            store.insert(job);
        }
        store
    }

    pub fn insert(&self, job: Job) {
        self.lock_jobs().insert(job.id, job);
    }

    #[must_use]
    pub fn get(&self, job_id: Uuid) -> Option<Job> {
        self.lock_jobs().get(&job_id).cloned()
    }

    /// All rows ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Job> {
        self.lock_jobs().values().cloned().collect()
    }

    /// Makes every `fetch_pending` call fail after `pages` successful ones.
    pub fn fail_reads_after(&self, pages: usize) {
        let mut faults = self.lock_faults();
        faults.reads_before_failure = Some(pages);
        faults.reads_served = 0;
    }

    /// Makes updates of `job_id` fail.
    pub fn fail_writes_for(&self, job_id: Uuid) {
        self.lock_faults().failing_writes.insert(job_id);
    }

    /// Makes `expire_pending_before` fail without touching any row.
    pub fn fail_expiry(&self, fail: bool) {
        self.lock_faults().fail_expiry = fail;
    }

    pub fn fail_ping(&self, fail: bool) {
        self.lock_faults().fail_ping = fail;
    }

    pub fn clear_faults(&self) {
        *self.lock_faults() = FaultPlan::default();
    }

    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, BTreeMap<Uuid, Job>> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, FaultPlan> {
        self.faults
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_write(&self, job_id: Uuid) -> Result<()> {
        if self.lock_faults().failing_writes.contains(&job_id) {
            bail!("simulated write failure for job {job_id}");
        }
        Ok(())
    }

    fn transition(&self, job_id: Uuid, apply: impl FnOnce(&mut Job)) -> Result<bool> {
        self.check_write(job_id)?;
        let mut jobs = self.lock_jobs();
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Pending => {
                apply(job);
                job.updated_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn fetch_pending(&self, after: Option<&PageCursor>, limit: usize) -> Result<Vec<Job>> {
        {
            let mut faults = self.lock_faults();
            if let Some(allowed) = faults.reads_before_failure {
                if faults.reads_served >= allowed {
                    bail!("simulated read failure");
                }
            }
            faults.reads_served += 1;
        }

        let mut candidates: Vec<Job> = self
            .lock_jobs()
            .values()
            .filter(|job| job.is_reconcile_candidate())
            .filter(|job| after.is_none_or(|cursor| (job.created_at, job.id) > (cursor.created_at, cursor.id)))
            .cloned()
            .collect();
        candidates.sort_by_key(|job| (job.created_at, job.id));
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn mark_complete(&self, job_id: Uuid, video_url: &str) -> Result<bool> {
        self.transition(job_id, |job| {
            job.status = JobStatus::Complete;
            job.video_url = Some(video_url.to_string());
        })
    }

    async fn mark_failed(&self, job_id: Uuid, message: &str) -> Result<bool> {
        self.transition(job_id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(message.to_string());
        })
    }

    async fn expire_pending_before(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<Uuid>> {
        if self.lock_faults().fail_expiry {
            bail!("simulated expiry failure");
        }
        let now = Utc::now();
        let mut expired = Vec::new();
        for job in self.lock_jobs().values_mut() {
            if job.status == JobStatus::Pending
                && !job.result_ref().is_resolved()
                && job.created_at < cutoff
            {
                job.status = JobStatus::Failed;
                job.error = Some(message.to_string());
                job.updated_at = Some(now);
                expired.push(job.id);
            }
        }
        Ok(expired)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.get(job_id))
    }

    async fn ping(&self) -> Result<()> {
        if self.lock_faults().fail_ping {
            bail!("simulated ping failure");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job_at(offset_secs: i64, task: &str) -> Job {
        let mut job = Job::new_pending("Acme", None, task, None);
        job.created_at = Utc::now() - Duration::seconds(offset_secs);
        job
    }

    #[tokio::test]
    async fn fetch_pending_pages_in_creation_order() {
        let oldest = job_at(30, "tlk_1");
        let middle = job_at(20, "tlk_2");
        let newest = job_at(10, "tlk_3");
        let store = MemoryJobStore::with_jobs([newest.clone(), oldest.clone(), middle.clone()]);

        let first = store.fetch_pending(None, 2).await.expect("first page");
        assert_eq!(
            first.iter().map(|job| job.id).collect::<Vec<_>>(),
            vec![oldest.id, middle.id]
        );

        let cursor = PageCursor::from(first.last().expect("last"));
        let second = store.fetch_pending(Some(&cursor), 2).await.expect("second page");
        assert_eq!(
            second.iter().map(|job| job.id).collect::<Vec<_>>(),
            vec![newest.id]
        );
    }

    #[tokio::test]
    async fn transitions_only_apply_to_pending_rows() {
        let job = job_at(5, "tlk_1");
        let store = MemoryJobStore::with_jobs([job.clone()]);

        assert!(store.mark_failed(job.id, "face not detected").await.expect("fail"));
        assert!(
            !store
                .mark_complete(job.id, "https://cdn.example.com/v.mp4")
                .await
                .expect("complete")
        );

        let stored = store.get(job.id).expect("row");
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("face not detected"));
        assert!(stored.video_url.is_none());
    }

    #[tokio::test]
    async fn simulated_faults_surface_as_errors() {
        let job = job_at(5, "tlk_1");
        let store = MemoryJobStore::with_jobs([job.clone()]);
        store.fail_reads_after(1);
        store.fail_writes_for(job.id);

        assert!(store.fetch_pending(None, 10).await.is_ok());
        assert!(store.fetch_pending(None, 10).await.is_err());
        assert!(store.mark_complete(job.id, "https://x/v.mp4").await.is_err());

        store.clear_faults();
        assert!(store.fetch_pending(None, 10).await.is_ok());
    }

    #[tokio::test]
    async fn expiry_skips_recent_and_terminal_rows() {
        let stale = job_at(7200, "tlk_old");
        let fresh = job_at(10, "tlk_new");
        let mut done = job_at(7200, "tlk_done");
        done.status = JobStatus::Complete;
        done.video_url = Some("https://cdn.example.com/done.mp4".into());
        let store = MemoryJobStore::with_jobs([stale.clone(), fresh.clone(), done.clone()]);

        let expired = store
            .expire_pending_before(Utc::now() - Duration::seconds(3600), "timed out")
            .await
            .expect("expire");

        assert_eq!(expired, vec![stale.id]);
        assert_eq!(store.get(fresh.id).expect("fresh").status, JobStatus::Pending);
        assert_eq!(store.get(done.id).expect("done"), done);
    }

    #[tokio::test]
    async fn failing_expiry_leaves_rows_untouched() {
        let stale = job_at(7200, "tlk_old");
        let store = MemoryJobStore::with_jobs([stale.clone()]);
        store.fail_expiry(true);

        let result = store
            .expire_pending_before(Utc::now() - Duration::seconds(3600), "timed out")
            .await;

        assert!(result.is_err());
        assert_eq!(store.get(stale.id).expect("stale"), stale);
    }

    #[tokio::test]
    async fn padded_sentinel_is_still_a_candidate() {
        let padded = Job::new_pending("Acme", None, "tlk_pad", Some("  pending:did ".into()));
        let store = MemoryJobStore::with_jobs([padded.clone()]);

        let candidates = store.fetch_pending(None, 10).await.expect("scan");

        assert_eq!(candidates.iter().map(|job| job.id).collect::<Vec<_>>(), vec![padded.id]);
    }
}
