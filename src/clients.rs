pub mod did;
pub mod runway;
mod types;

use std::{collections::HashMap, fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

pub use did::{DIdClient, DIdConfig};
pub use runway::{RunwayClient, RunwayConfig};
pub use types::{VendorError, VendorStatus};

use crate::config::Config;
use crate::store::models::Provider;
use crate::util::redact::redact;

/// Status lookup against a video synthesis vendor.
#[async_trait]
pub trait VendorStatusClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Fetches and classifies the current state of an external task.
    ///
    /// # Errors
    /// Transport failures, timeouts, non-2xx answers and bad payloads surface as [`VendorError`].
    async fn fetch_status(&self, task_id: &str) -> Result<VendorStatus, VendorError>;
}

/// Status clients keyed by provider.
///
/// Providers without an API key are absent.
#[derive(Clone, Default)]
pub struct VendorRegistry {
    clients: HashMap<Provider, Arc<dyn VendorStatusClient>>,
}

impl VendorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client, replacing any existing one for the same provider.
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn VendorStatusClient>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }

    /// Builds clients for every provider that has a key configured.
    ///
    /// # Errors
    /// Returns an error when a base URL is invalid or an HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();

        if let Some(api_key) = config.did_api_key() {
            info!(
                base_url = config.did_base_url(),
                api_key = %redact(api_key),
                "D-ID status client configured"
            );
            let client = DIdClient::new(DIdConfig {
                base_url: config.did_base_url().to_string(),
                api_key: api_key.to_string(),
                connect_timeout: config.vendor_connect_timeout(),
                total_timeout: config.vendor_total_timeout(),
            })?;
            registry = registry.with_client(Arc::new(client));
        } else {
            info!("DID_API_KEY not set; D-ID jobs will be left pending");
        }

        if let Some(api_key) = config.runway_api_key() {
            info!(
                base_url = config.runway_base_url(),
                api_version = config.runway_api_version(),
                api_key = %redact(api_key),
                "Runway status client configured"
            );
            let client = RunwayClient::new(RunwayConfig {
                base_url: config.runway_base_url().to_string(),
                api_key: api_key.to_string(),
                api_version: config.runway_api_version().to_string(),
                connect_timeout: config.vendor_connect_timeout(),
                total_timeout: config.vendor_total_timeout(),
            })?;
            registry = registry.with_client(Arc::new(client));
        } else {
            info!("RUNWAY_API_KEY not set; Runway jobs will be left pending");
        }

        Ok(registry)
    }

    #[must_use]
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn VendorStatusClient>> {
        self.clients.get(&provider).cloned()
    }

    #[must_use]
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.clients.keys().copied().collect();
        providers.sort_by_key(|provider| provider.as_str());
        providers
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl fmt::Debug for VendorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}
