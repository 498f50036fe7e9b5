//! Status LED service provider.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::{app_context::AppState, providers::traits::ServiceProvider, task_manager::TaskManager};

/// Runs the status LED arbiter.
///
/// The LED is one physical pin signalled from several managers; this
/// service owns the pin and plays queued flash patterns in order. It must
/// start before the services that flash, so its priority sits just below
/// the fan loop.
pub struct LedServiceProvider {
    state: Arc<AppState>,
}

impl LedServiceProvider {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ServiceProvider for LedServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let driver = self
            .state
            .take_led_driver()
            .await
            .ok_or_else(|| anyhow!("status LED driver already claimed"))?;

        task_manager.spawn_task(self.name().to_string(), |cancel_token| async move {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("LED service cancelled");
                    Ok(())
                }
                result = driver.run() => result,
            }
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LedService"
    }

    fn priority(&self) -> i32 {
        9
    }
}
