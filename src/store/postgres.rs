//! Postgres implementation of [`JobStore`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, migrate::Migrator, postgres::PgRow};
use uuid::Uuid;

use super::JobStore;
use super::models::{Job, JobStatus, PENDING_SENTINEL_PREFIX, PageCursor, Provider};

/// Versioned schema migrations for the `jobs` table.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const JOB_COLUMNS: &str = "id, business_name, created_at, updated_at, status, provider, \
                           provider_task_id, video_url, error";

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    /// Returns an error when a migration fails to apply.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .context("failed to run jobs migrations")
    }

    fn row_to_job(row: &PgRow) -> Result<Job> {
        let id: Uuid = row.try_get("id").context("failed to get id")?;
        let business_name: String = row
            .try_get("business_name")
            .context("failed to get business_name")?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .context("failed to get created_at")?;
        let updated_at: Option<DateTime<Utc>> = row
            .try_get("updated_at")
            .context("failed to get updated_at")?;
        let status_str: String = row.try_get("status").context("failed to get status")?;
        let provider_str: Option<String> =
            row.try_get("provider").context("failed to get provider")?;
        let provider_task_id: Option<String> = row
            .try_get("provider_task_id")
            .context("failed to get provider_task_id")?;
        let video_url: Option<String> =
            row.try_get("video_url").context("failed to get video_url")?;
        let error: Option<String> = row.try_get("error").context("failed to get error")?;

        let status = JobStatus::parse(&status_str)
            .with_context(|| format!("invalid job status: {status_str}"))?;

        Ok(Job {
            id,
            business_name,
            created_at,
            updated_at,
            status,
            provider: provider_str.as_deref().and_then(Provider::parse),
            provider_task_id,
            video_url,
            error,
        })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn fetch_pending(&self, after: Option<&PageCursor>, limit: usize) -> Result<Vec<Job>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            r"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status = 'pending'
              AND provider_task_id IS NOT NULL
              AND btrim(provider_task_id) <> ''
              AND (video_url IS NULL OR btrim(video_url) = '' OR btrim(video_url) LIKE $1)
              AND ($2::timestamptz IS NULL OR (created_at, id) > ($2::timestamptz, $3::uuid))
            ORDER BY created_at ASC, id ASC
            LIMIT $4
            "
        ))
        .bind(format!("{PENDING_SENTINEL_PREFIX}%"))
        .bind(after.map(|cursor| cursor.created_at))
        .bind(after.map(|cursor| cursor.id))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch pending jobs")?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn mark_complete(&self, job_id: Uuid, video_url: &str) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE jobs
            SET status = 'complete',
                video_url = $2,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'
            ",
        )
        .bind(job_id)
        .bind(video_url)
        .execute(&self.pool)
        .await
        .context("failed to mark job as complete")?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, job_id: Uuid, message: &str) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE jobs
            SET status = 'failed',
                error = $2,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'
            ",
        )
        .bind(job_id)
        .bind(message)
        .execute(&self.pool)
        .await
        .context("failed to mark job as failed")?;

        Ok(result.rows_affected() == 1)
    }

    async fn expire_pending_before(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r"
            UPDATE jobs
            SET status = 'failed',
                error = $2,
                updated_at = NOW()
            WHERE status = 'pending'
              AND created_at < $1
              AND (video_url IS NULL OR btrim(video_url) = '' OR btrim(video_url) LIKE $3)
            RETURNING id
            ",
        )
        .bind(cutoff)
        .bind(message)
        .bind(format!("{PENDING_SENTINEL_PREFIX}%"))
        .fetch_all(&self.pool)
        .await
        .context("failed to expire stale pending jobs")?;

        rows.iter()
            .map(|row| row.try_get("id").context("failed to get expired job id"))
            .collect()
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to get job")?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("job store ping failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    /// Connects to `DATABASE_URL` and prepares a clean schema, or returns `None` when unset.
    async fn setup_store() -> Option<PgJobStore> {
        let database_url = std::env::var("DATABASE_URL").ok()?;
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("database connection");
        let store = PgJobStore::new(pool);
        store.migrate().await.expect("migrations apply");
        sqlx::query("DELETE FROM jobs")
            .execute(&store.pool)
            .await
            .expect("clean jobs");
        Some(store)
    }

    async fn insert(store: &PgJobStore, job: &Job) {
        sqlx::query(
            r"
            INSERT INTO jobs (id, business_name, created_at, status, provider, provider_task_id, video_url, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(job.id)
        .bind(&job.business_name)
        .bind(job.created_at)
        .bind(job.status.as_str())
        .bind(job.provider.map(Provider::as_str))
        .bind(&job.provider_task_id)
        .bind(&job.video_url)
        .bind(&job.error)
        .execute(&store.pool)
        .await
        .expect("insert job");
    }

    #[tokio::test]
    async fn pending_scan_and_conditional_updates() {
        let Some(store) = setup_store().await else {
            return;
        };

        let pending = Job::new_pending("Acme", None, "tlk_abc", Some("pending:did".into()));
        let mut resolved = Job::new_pending("Beta", None, "tlk_def", None);
        resolved.status = JobStatus::Complete;
        resolved.video_url = Some("https://cdn.example.com/beta.mp4".into());
        insert(&store, &pending).await;
        insert(&store, &resolved).await;

        let candidates = store.fetch_pending(None, 10).await.expect("scan");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, pending.id);

        let next = store
            .fetch_pending(Some(&PageCursor::from(&candidates[0])), 10)
            .await
            .expect("second page");
        assert!(next.is_empty());

        assert!(
            store
                .mark_complete(pending.id, "https://cdn.example.com/acme.mp4")
                .await
                .expect("complete")
        );
        assert!(
            !store
                .mark_failed(pending.id, "too late")
                .await
                .expect("conditional fail")
        );

        let stored = store.get_job(pending.id).await.expect("get").expect("row");
        assert_eq!(stored.status, JobStatus::Complete);
        assert_eq!(
            stored.video_url.as_deref(),
            Some("https://cdn.example.com/acme.mp4")
        );
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn padded_sentinel_rows_are_scanned_and_expired() {
        let Some(store) = setup_store().await else {
            return;
        };

        let mut padded = Job::new_pending("Acme", None, "tlk_pad", Some("  pending:did ".into()));
        padded.created_at = Utc::now() - chrono::Duration::hours(2);
        insert(&store, &padded).await;

        let candidates = store.fetch_pending(None, 10).await.expect("scan");
        assert_eq!(candidates.iter().map(|job| job.id).collect::<Vec<_>>(), vec![padded.id]);

        let expired = store
            .expire_pending_before(Utc::now() - chrono::Duration::hours(1), "timed out")
            .await
            .expect("expire");
        assert_eq!(expired, vec![padded.id]);
    }
}
