//! Motion-activated lighting.
//!
//! A sampler polls the PIR sensor and tracks presence transitions; a
//! companion timer switches the light off a configurable delay after the
//! last detection. Disabling the feature stops actuation only: transitions
//! are still observed and published so status surfaces stay live.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{debug, info};
use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};

use crate::{
    config::ConfigManager,
    event::{Event, EventBus},
    hw::DigitalInput,
    light::Light,
};

/// PIR polling interval.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);
/// Off-deadline check interval.
const OFF_CHECK_INTERVAL: Duration = Duration::from_millis(100);

struct MotionState {
    detected: bool,
    /// Armed when presence ends; cleared on re-detection.
    off_deadline: Option<Instant>,
}

pub struct MotionManager {
    pir: Arc<dyn DigitalInput>,
    light: Arc<Light>,
    config_manager: ConfigManager,
    bus: EventBus,
    enabled: RwLock<bool>,
    state: Mutex<MotionState>,
}

impl MotionManager {
    pub fn new(
        pir: Arc<dyn DigitalInput>,
        light: Arc<Light>,
        config_manager: ConfigManager,
        bus: EventBus,
        enabled: bool,
    ) -> Self {
        Self {
            pir,
            light,
            config_manager,
            bus,
            enabled: RwLock::new(enabled),
            state: Mutex::new(MotionState {
                detected: false,
                off_deadline: None,
            }),
        }
    }

    /// Whether motion currently actuates the light.
    pub async fn is_enabled(&self) -> bool {
        *self.enabled.read().await
    }

    pub async fn enable(&self) {
        info!("Motion lighting enabled");
        *self.enabled.write().await = true;
    }

    /// Stops actuating the light; detection keeps running.
    pub async fn disable(&self) {
        info!("Motion lighting disabled");
        *self.enabled.write().await = false;
    }

    /// Last observed presence state.
    pub async fn motion_detected(&self) -> bool {
        self.state.lock().await.detected
    }

    /// Samples the PIR sensor and reacts to presence transitions.
    pub async fn run_sampler(&self) -> Result<()> {
        info!("Starting motion sampler");
        loop {
            let level = self.pir.level().await?;
            self.observe(level).await?;
            tokio::time::sleep(SAMPLE_INTERVAL).await;
        }
    }

    async fn observe(&self, level: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        if level == state.detected {
            return Ok(());
        }

        state.detected = level;
        if level {
            debug!("Motion detected");
            // Presence cancels a pending switch-off.
            state.off_deadline = None;
            drop(state);

            self.bus.publish(Event::MotionChanged(true));
            if *self.enabled.read().await {
                self.light.on().await?;
            } else {
                debug!("Motion lighting disabled, not switching light on");
            }
        } else {
            let delay = self.config_manager.get().await.motion.light_off_delay_secs;
            debug!("Motion ended, light off in {delay}s");
            state.off_deadline = Some(Instant::now() + Duration::from_secs(u64::from(delay)));
            drop(state);

            self.bus.publish(Event::MotionChanged(false));
        }
        Ok(())
    }

    /// Switches the light off once the post-presence delay has elapsed.
    pub async fn run_off_timer(&self) -> Result<()> {
        info!("Starting motion off-timer");
        loop {
            self.check_deadline().await?;
            tokio::time::sleep(OFF_CHECK_INTERVAL).await;
        }
    }

    async fn check_deadline(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let due = !state.detected
            && state
                .off_deadline
                .is_some_and(|deadline| Instant::now() >= deadline);
        if !due {
            return Ok(());
        }

        // Keep the deadline armed while disabled so re-enabling still
        // switches the light off.
        if !*self.enabled.read().await {
            return Ok(());
        }

        state.off_deadline = None;
        drop(state);

        if self.light.is_on().await {
            info!("Motion delay elapsed, light off");
            self.light.off().await?;
        }
        Ok(())
    }
}
