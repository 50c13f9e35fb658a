//! Application state management

use anyhow::{Context, Result};
use meshmap_core::{RegistrySource, SnapshotStore};
use meshmap_otbr::OtbrClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::poller::Poller;
use crate::registry_file::FileRegistry;

/// Shared application state
pub struct AppState {
    /// Poll cycle driver
    pub poller: Arc<Poller<OtbrClient>>,
    /// Last good snapshot and health
    pub store: Arc<SnapshotStore>,
    /// Configuration
    pub config: Config,
    /// Stops the scheduler and aborts an in-flight fetch
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config) -> Result<Arc<Self>> {
        config.validate()?;

        let client = OtbrClient::new(config.otbr_url()?, config.otbr_timeout())
            .context("Failed to create OTBR client")?;

        let registry: Option<Arc<dyn RegistrySource>> = match &config.registry.path {
            Some(path) => {
                info!(path = %path.display(), "Using registry file");
                Some(Arc::new(FileRegistry::new(path)))
            }
            None => {
                info!("No registry configured, nodes will be unmatched");
                None
            }
        };

        let store = Arc::new(SnapshotStore::new(config.health.degraded_after));
        let shutdown = CancellationToken::new();
        let poller = Arc::new(Poller::new(
            client,
            registry,
            config.engine_settings(),
            store.clone(),
            config.poll_interval(),
            shutdown.child_token(),
        ));

        Ok(Arc::new(Self {
            poller,
            store,
            config,
            shutdown,
        }))
    }
}
