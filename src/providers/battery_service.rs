//! Battery monitoring service provider.

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::{app_context::AppState, providers::traits::ServiceProvider, task_manager::TaskManager};

/// Runs the battery sampler and its display updater.
pub struct BatteryServiceProvider {
    state: Arc<AppState>,
}

impl BatteryServiceProvider {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ServiceProvider for BatteryServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let sampler_state = self.state.clone();
        task_manager.spawn_task("BatterySampler".to_string(), |cancel_token| async move {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("Battery sampler cancelled");
                    Ok(())
                }
                result = sampler_state.battery.run_sampler() => result,
            }
        });

        let display_state = self.state.clone();
        task_manager.spawn_task("BatteryDisplay".to_string(), |cancel_token| async move {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("Battery display updater cancelled");
                    Ok(())
                }
                result = display_state.battery.run_display_updater() => result,
            }
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "BatteryService"
    }

    fn priority(&self) -> i32 {
        4
    }
}
