//! Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub runs_total: Counter,
    pub runs_failed: Counter,
    pub runs_rejected: Counter,
    pub jobs_completed: Counter,
    pub jobs_failed: Counter,
    pub jobs_expired: Counter,
    pub jobs_skipped: Counter,
    pub vendor_transient_errors: Counter,
    pub store_write_errors: Counter,

    // ヒストグラム
    pub run_duration: Histogram,
    pub vendor_lookup_duration: Histogram,

    // ゲージ
    pub pending_candidates: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成し、`registry` に登録する。
    ///
    /// # Errors
    /// 同名のメトリクスが既に登録されている場合はエラーを返す。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            runs_total: register_counter_with_registry!(
                "promo_reconcile_runs_total",
                "Total number of reconciliation runs started",
                registry
            )?,
            runs_failed: register_counter_with_registry!(
                "promo_reconcile_runs_failed_total",
                "Total number of reconciliation runs aborted by a store read failure",
                registry
            )?,
            runs_rejected: register_counter_with_registry!(
                "promo_reconcile_runs_rejected_total",
                "Total number of reconciliation triggers rejected because a run was in progress",
                registry
            )?,
            jobs_completed: register_counter_with_registry!(
                "promo_jobs_completed_total",
                "Total number of jobs marked complete",
                registry
            )?,
            jobs_failed: register_counter_with_registry!(
                "promo_jobs_failed_total",
                "Total number of jobs marked failed from a vendor error",
                registry
            )?,
            jobs_expired: register_counter_with_registry!(
                "promo_jobs_expired_total",
                "Total number of stale pending jobs failed by the expiry policy",
                registry
            )?,
            jobs_skipped: register_counter_with_registry!(
                "promo_jobs_skipped_total",
                "Total number of conditional updates that found the job no longer pending",
                registry
            )?,
            vendor_transient_errors: register_counter_with_registry!(
                "promo_vendor_transient_errors_total",
                "Total number of vendor lookups that failed or timed out",
                registry
            )?,
            store_write_errors: register_counter_with_registry!(
                "promo_store_write_errors_total",
                "Total number of failed job updates",
                registry
            )?,
            run_duration: register_histogram_with_registry!(
                "promo_reconcile_run_duration_seconds",
                "Duration of a full reconciliation run",
                registry
            )?,
            vendor_lookup_duration: register_histogram_with_registry!(
                "promo_vendor_lookup_duration_seconds",
                "Duration of a single vendor status lookup",
                registry
            )?,
            pending_candidates: register_gauge_with_registry!(
                "promo_pending_candidates",
                "Pending jobs scanned by the most recent reconciliation run",
                registry
            )?,
        })
    }
}
