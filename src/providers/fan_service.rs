//! Fan assessment service provider.

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::{app_context::AppState, providers::traits::ServiceProvider, task_manager::TaskManager};

/// Runs the periodic humidity assessment loop.
///
/// This is the one service the daemon exists for, so it is critical and
/// starts first. The cadence follows the weather poll interval; the first
/// assessment runs immediately on startup.
pub struct FanServiceProvider {
    state: Arc<AppState>,
}

impl FanServiceProvider {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ServiceProvider for FanServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        task_manager.spawn_task(self.name().to_string(), |cancel_token| async move {
            run_fan_service(state, cancel_token).await
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "FanService"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}

async fn run_fan_service(state: Arc<AppState>, cancel_token: CancellationToken) -> Result<()> {
    let config = state.config().await;
    if !config.fan.enabled {
        info!("Fan control disabled in config");
        cancel_token.cancelled().await;
        return Ok(());
    }

    let mut ticker = interval(Duration::from_secs(u64::from(
        config.weather.poll_interval_secs,
    )));

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Fan service cancelled");
                return Ok(());
            }
            _ = ticker.tick() => {
                // The fail-safe inside assess handles missing data; an Err
                // here is an actuator or display fault and worth surfacing,
                // but one bad cycle must not kill the loop.
                if let Err(e) = state.fan.assess().await {
                    error!("Fan assessment failed: {e}");
                }
            }
        }
    }
}
