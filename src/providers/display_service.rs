//! Display backlight service provider.

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::{app_context::AppState, providers::traits::ServiceProvider, task_manager::TaskManager};

/// Runs the backlight idle timeout loop.
pub struct DisplayServiceProvider {
    state: Arc<AppState>,
}

impl DisplayServiceProvider {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ServiceProvider for DisplayServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        task_manager.spawn_task(self.name().to_string(), |cancel_token| async move {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("Backlight service cancelled");
                    Ok(())
                }
                result = state.display.run_backlight_timeout() => result,
            }
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "BacklightService"
    }

    fn priority(&self) -> i32 {
        7
    }
}
