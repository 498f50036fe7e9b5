//! Concrete driver sets backing the [`crate::hw`] traits.
//!
//! The set is selected from the `hardware` config section. Physical GPIO or
//! I2C bindings are provided out of tree; the simulated set ships with the
//! daemon so it can run end-to-end on a development host.

pub mod sim;

use std::sync::Arc;

use anyhow::Result;

use crate::{
    config::Config,
    hw::{AdcInput, DigitalInput, DigitalOutput, DisplayPanel, HumiditySensor, PwmOutput, Radio},
};

/// The full set of hardware handles the managers are wired to.
///
/// Constructed once at startup; each handle is subsequently owned by
/// exactly one manager.
pub struct HardwareSet {
    pub sensor: Arc<dyn HumiditySensor>,
    pub panel: Arc<dyn DisplayPanel>,
    pub radio: Arc<dyn Radio>,
    pub fan_pwm: Arc<dyn PwmOutput>,
    pub light_pwm: Arc<dyn PwmOutput>,
    pub pir: Arc<dyn DigitalInput>,
    pub battery_adc: Arc<dyn AdcInput>,
    pub status_led: Arc<dyn DigitalOutput>,
    /// One input line per configured button, in config order.
    pub buttons: Vec<(String, Arc<dyn DigitalInput>)>,
}

/// Builds the driver set named by the configuration.
pub fn build(config: &Config) -> Result<HardwareSet> {
    match &config.hardware {
        crate::config::HardwareCfg::Simulated {
            indoor_humidity,
            battery_adc,
        } => Ok(sim::build_simulated(
            *indoor_humidity,
            *battery_adc,
            &config.buttons,
        )),
    }
}
