//! Motion lighting service provider.

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::{app_context::AppState, providers::traits::ServiceProvider, task_manager::TaskManager};

/// Runs the PIR sampler and the light-off timer.
///
/// Both tasks run even while motion lighting is disabled: detection stays
/// observable over D-Bus and the event bus, only actuation is gated.
pub struct MotionServiceProvider {
    state: Arc<AppState>,
}

impl MotionServiceProvider {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ServiceProvider for MotionServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let sampler_state = self.state.clone();
        task_manager.spawn_task("MotionSampler".to_string(), |cancel_token| async move {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("Motion sampler cancelled");
                    Ok(())
                }
                result = sampler_state.motion.run_sampler() => result,
            }
        });

        let timer_state = self.state.clone();
        task_manager.spawn_task("MotionOffTimer".to_string(), |cancel_token| async move {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("Motion off-timer cancelled");
                    Ok(())
                }
                result = timer_state.motion.run_off_timer() => result,
            }
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "MotionService"
    }

    fn priority(&self) -> i32 {
        5
    }
}
