pub mod memory;
pub mod models;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryJobStore;
pub use models::{Job, JobStatus, PageCursor, Provider, ResultRef};
pub use postgres::PgJobStore;

/// JobStore - `jobs` テーブルへのデータアクセス層
///
/// 状態遷移はすべて条件付き更新で、`pending` の行だけを対象にする。
/// 戻り値の `bool` は実際に行が遷移したかどうかを表す。
#[async_trait]
pub trait JobStore: Send + Sync {
    /// 照合対象の保留ジョブを `(created_at, id)` 昇順で最大 `limit` 件取得する
    async fn fetch_pending(&self, after: Option<&PageCursor>, limit: usize) -> Result<Vec<Job>>;

    /// 保留ジョブを完了にし、動画URLを確定させる
    async fn mark_complete(&self, job_id: Uuid, video_url: &str) -> Result<bool>;

    /// 保留ジョブを失敗にし、エラーメッセージを保存する
    async fn mark_failed(&self, job_id: Uuid, message: &str) -> Result<bool>;

    /// `cutoff` より前に作成された保留ジョブを失敗にし、対象IDを返す
    async fn expire_pending_before(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<Uuid>>;

    /// ジョブを1件取得する
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// 疎通確認
    async fn ping(&self) -> Result<()>;
}
