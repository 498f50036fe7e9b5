//! Battery voltage monitoring.
//!
//! The pack voltage is read through a resistive divider into the ADC. Two
//! calibration strategies are supported because boards differ in where the
//! measurement error sits: a fixed voltage offset added after scaling, or
//! an offset applied to the raw ADC counts before scaling.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use event_listener::Event as Notify;
use log::{debug, info, warn};
use tokio::sync::RwLock;

use crate::{
    config::{BatteryCalibration, BatteryCfg, ConfigManager},
    display::{self, DisplayManager},
    event::{Event, EventBus},
    hw::AdcInput,
};

/// ADC reference voltage.
const ADC_REF_VOLTS: f64 = 3.3;
/// Full-scale ADC reading.
const ADC_FULL_SCALE: f64 = 65535.0;

/// One battery voltage sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    pub volts: f64,
    pub sampled_at: DateTime<Utc>,
}

pub struct BatteryMonitor {
    adc: Arc<dyn AdcInput>,
    config_manager: ConfigManager,
    display: Arc<DisplayManager>,
    bus: EventBus,
    latest: RwLock<Option<BatteryReading>>,
    updated: Notify,
}

impl BatteryMonitor {
    pub fn new(
        adc: Arc<dyn AdcInput>,
        config_manager: ConfigManager,
        display: Arc<DisplayManager>,
        bus: EventBus,
    ) -> Self {
        Self {
            adc,
            config_manager,
            display,
            bus,
            latest: RwLock::new(None),
            updated: Notify::new(),
        }
    }

    /// Most recent sample, if any.
    pub async fn latest(&self) -> Option<BatteryReading> {
        *self.latest.read().await
    }

    /// Reads and calibrates one voltage sample.
    pub async fn read_voltage(&self) -> Result<f64> {
        let raw = self.adc.read_raw().await?;
        let cfg = self.config_manager.get().await.battery.clone();
        Ok(calibrated_volts(raw, &cfg))
    }

    /// Periodic sampling loop.
    pub async fn run_sampler(&self) -> Result<()> {
        let interval = {
            let cfg = self.config_manager.get().await;
            Duration::from_secs(u64::from(cfg.battery.poll_interval_secs))
        };
        info!("Battery sampling every {}s", interval.as_secs());

        loop {
            match self.read_voltage().await {
                Ok(volts) => {
                    debug!("Battery at {volts:.2} V");
                    *self.latest.write().await = Some(BatteryReading {
                        volts,
                        sampled_at: Utc::now(),
                    });
                    self.bus.publish(Event::BatteryUpdated(volts));
                    self.updated.notify(usize::MAX);
                }
                Err(e) => warn!("Battery read failed: {e}"),
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Pushes fresh samples to the status display as they arrive.
    pub async fn run_display_updater(&self) -> Result<()> {
        loop {
            let fresh = self.updated.listen();
            fresh.await;

            if let Some(reading) = self.latest().await {
                self.display
                    .update_status(&[(
                        display::KEY_BATTERY_VOLTAGE,
                        format!("{:.2} v", reading.volts),
                    )])
                    .await?;
            }
        }
    }
}

/// Divider scaling plus the configured calibration.
fn calibrated_volts(raw: u16, cfg: &BatteryCfg) -> f64 {
    let scaling = (cfg.r1_ohms + cfg.r2_ohms) / cfg.r2_ohms;
    match cfg.calibration {
        BatteryCalibration::VoltageOffset { volts } => {
            f64::from(raw) * ADC_REF_VOLTS / ADC_FULL_SCALE * scaling + volts
        }
        BatteryCalibration::AdcOffset { counts } => {
            let corrected = (i32::from(raw) + counts).clamp(0, 65535);
            f64::from(corrected) * ADC_REF_VOLTS / ADC_FULL_SCALE * scaling
        }
    }
}
