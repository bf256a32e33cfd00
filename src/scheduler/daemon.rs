use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{error, info, warn};

use crate::reconciler::{ReconcileError, Reconciler};

/// 一定間隔でリコンサイルを実行するデーモンを起動する。
///
/// 実行が間隔より長引いた場合、取りこぼしたティックはまとめず次の間隔まで待つ。
pub fn spawn_reconcile_daemon(reconciler: Arc<Reconciler>, every: Duration) -> JoinHandle<()> {
    ReconcileDaemon::new(reconciler, every).spawn()
}

struct ReconcileDaemon {
    reconciler: Arc<Reconciler>,
    every: Duration,
}

impl ReconcileDaemon {
    fn new(reconciler: Arc<Reconciler>, every: Duration) -> Self {
        Self { reconciler, every }
    }

    fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_seconds = self.every.as_secs(),
            "scheduled periodic reconciliation"
        );

        loop {
            ticker.tick().await;
            match self.reconciler.reconcile_pending_jobs().await {
                Ok(summary) => info!(
                    candidates = summary.candidates,
                    updated = summary.updated(),
                    transient_errors = summary.transient_errors,
                    "periodic reconciliation completed"
                ),
                Err(ReconcileError::AlreadyRunning) => {
                    warn!("previous reconciliation still running, skipping tick");
                }
                Err(err) => error!(error = %err, "periodic reconciliation failed"),
            }
        }
    }
}
