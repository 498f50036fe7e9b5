//! Provider for the shared application state.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    app_context::AppState, config::ConfigManager, event::EventBus, providers::traits::AsyncProvider,
};

/// Builds the [`AppState`] from configuration: driver set, managers, and
/// the wiring between them.
pub struct AppStateProvider {
    config_manager: ConfigManager,
    bus: EventBus,
}

impl AppStateProvider {
    pub fn new(config_manager: ConfigManager, bus: EventBus) -> Self {
        Self {
            config_manager,
            bus,
        }
    }
}

#[async_trait]
impl AsyncProvider<Arc<AppState>> for AppStateProvider {
    async fn provide(&self) -> Result<Arc<AppState>> {
        let state = AppState::new(self.config_manager.clone(), self.bus.clone()).await?;
        Ok(Arc::new(state))
    }
}
