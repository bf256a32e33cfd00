use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::{
    api,
    clients::VendorRegistry,
    config::Config,
    observability::Telemetry,
    reconciler::{Reconciler, ReconcilerSettings},
    store::{JobStore, PgJobStore},
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    telemetry: Telemetry,
    store: Arc<dyn JobStore>,
    reconciler: Arc<Reconciler>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn store(&self) -> &dyn JobStore {
        self.registry.store.as_ref()
    }

    pub(crate) fn reconciler(&self) -> &Reconciler {
        &self.registry.reconciler
    }
}

impl ComponentRegistry {
    /// 構成情報と依存をまとめて初期化し、アプリケーションの共有レジストリを構築する。
    ///
    /// # Errors
    /// Telemetry の初期化、接続プールの構成、マイグレーション、HTTP クライアント構築の
    /// いずれかが失敗した場合はエラーを返す。
    pub async fn build(config: &Config) -> Result<Self> {
        let telemetry = Telemetry::new()?;

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections())
            .acquire_timeout(config.db_acquire_timeout())
            .test_before_acquire(true)
            .connect_lazy(config.db_dsn())
            .context("failed to configure jobs connection pool")?;
        let store = PgJobStore::new(pool);
        if config.run_migrations() {
            store.migrate().await?;
            info!("jobs migrations applied");
        }

        let vendors = VendorRegistry::from_config(config)?;
        let settings = ReconcilerSettings::from_config(config);

        Ok(Self::from_parts(telemetry, Arc::new(store), vendors, settings))
    }

    /// 既に構築済みの部品からレジストリを組み立てる。テストやローカル実行でストアを差し替える際に使う。
    #[must_use]
    pub fn from_parts(
        telemetry: Telemetry,
        store: Arc<dyn JobStore>,
        vendors: VendorRegistry,
        settings: ReconcilerSettings,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            vendors,
            settings,
            telemetry.metrics_arc(),
        ));
        Self {
            telemetry,
            store,
            reconciler,
        }
    }

    #[must_use]
    pub fn reconciler(&self) -> Arc<Reconciler> {
        Arc::clone(&self.reconciler)
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}
