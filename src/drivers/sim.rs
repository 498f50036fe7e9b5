//! Simulated hardware for development hosts.
//!
//! Sensors report configured values, the display renders through the
//! logger, the radio comes up immediately, and actuators record the last
//! value written so accessors stay meaningful.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU16, Ordering},
};

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};

use crate::{
    config::ButtonCfg,
    drivers::HardwareSet,
    hw::{
        AdcInput, ClimateReading, DigitalInput, DigitalOutput, DisplayPanel, HumiditySensor,
        IfConfig, PwmOutput, Radio,
    },
};

// Link status codes of the real radio driver; the simulator speaks the
// same protocol.
const LINK_DOWN: i8 = 0;
const LINK_UP: i8 = 3;

/// Pico Display dimensions, so layout behaves like the real panel.
const SIM_PANEL_WIDTH: u32 = 240;
const SIM_PANEL_HEIGHT: u32 = 135;
const SIM_FONT_WIDTH: u32 = 6;

pub fn build_simulated(
    indoor_humidity: f64,
    battery_adc: u16,
    buttons: &[ButtonCfg],
) -> HardwareSet {
    HardwareSet {
        sensor: Arc::new(SimSensor { indoor_humidity }),
        panel: Arc::new(SimPanel),
        radio: Arc::new(SimRadio {
            connected: AtomicBool::new(false),
        }),
        fan_pwm: Arc::new(SimPwm::named("fan")),
        light_pwm: Arc::new(SimPwm::named("light")),
        pir: Arc::new(SimInput::default()),
        battery_adc: Arc::new(SimAdc { raw: battery_adc }),
        status_led: Arc::new(SimOutput::named("status-led")),
        buttons: buttons
            .iter()
            .map(|b| {
                // Buttons are active low: idle level is high.
                (
                    b.name.clone(),
                    Arc::new(SimInput::with_level(true)) as Arc<dyn DigitalInput>,
                )
            })
            .collect(),
    }
}

struct SimSensor {
    indoor_humidity: f64,
}

#[async_trait]
impl HumiditySensor for SimSensor {
    async fn read(&self) -> Result<ClimateReading> {
        Ok(ClimateReading {
            temperature: 21.0,
            pressure: 1013.25,
            humidity: self.indoor_humidity,
        })
    }
}

struct SimPanel;

#[async_trait]
impl DisplayPanel for SimPanel {
    fn bounds(&self) -> (u32, u32) {
        (SIM_PANEL_WIDTH, SIM_PANEL_HEIGHT)
    }

    fn measure_text(&self, text: &str, scale: u32) -> u32 {
        text.chars().count() as u32 * SIM_FONT_WIDTH * scale
    }

    async fn clear(&self) -> Result<()> {
        debug!("[panel] clear");
        Ok(())
    }

    async fn draw_text(
        &self,
        text: &str,
        x: u32,
        y: u32,
        _wrap_width: u32,
        _scale: u32,
    ) -> Result<()> {
        debug!("[panel] ({x:3},{y:3}) {text}");
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn set_backlight(&self, level: f64) -> Result<()> {
        debug!("[panel] backlight {level:.1}");
        Ok(())
    }
}

struct SimRadio {
    connected: AtomicBool,
}

#[async_trait]
impl Radio for SimRadio {
    async fn connect(&self, ssid: &str, _password: &str) -> Result<()> {
        info!("[radio] joining '{ssid}'");
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn status(&self) -> Result<i8> {
        Ok(if self.connected.load(Ordering::SeqCst) {
            LINK_UP
        } else {
            LINK_DOWN
        })
    }

    async fn ifconfig(&self) -> Result<IfConfig> {
        Ok(IfConfig {
            ip: "192.168.1.50".into(),
            subnet: "255.255.255.0".into(),
            gateway: "192.168.1.1".into(),
            dns: "192.168.1.1".into(),
        })
    }

    fn mac(&self) -> String {
        "de:ad:be:ef:00:01".into()
    }
}

struct SimPwm {
    name: &'static str,
    duty: AtomicU16,
}

impl SimPwm {
    fn named(name: &'static str) -> Self {
        Self {
            name,
            duty: AtomicU16::new(0),
        }
    }
}

#[async_trait]
impl PwmOutput for SimPwm {
    fn max_duty(&self) -> u16 {
        u16::MAX
    }

    async fn set_duty(&self, duty: u16) -> Result<()> {
        self.duty.store(duty, Ordering::SeqCst);
        debug!("[pwm:{}] duty {duty}", self.name);
        Ok(())
    }
}

#[derive(Default)]
struct SimInput {
    level: AtomicBool,
}

impl SimInput {
    fn with_level(level: bool) -> Self {
        Self {
            level: AtomicBool::new(level),
        }
    }
}

#[async_trait]
impl DigitalInput for SimInput {
    async fn level(&self) -> Result<bool> {
        Ok(self.level.load(Ordering::SeqCst))
    }
}

struct SimOutput {
    name: &'static str,
    level: AtomicBool,
}

impl SimOutput {
    fn named(name: &'static str) -> Self {
        Self {
            name,
            level: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DigitalOutput for SimOutput {
    async fn set_level(&self, high: bool) -> Result<()> {
        self.level.store(high, Ordering::SeqCst);
        debug!("[gpio:{}] {}", self.name, if high { "high" } else { "low" });
        Ok(())
    }
}

struct SimAdc {
    raw: u16,
}

#[async_trait]
impl AdcInput for SimAdc {
    async fn read_raw(&self) -> Result<u16> {
        Ok(self.raw)
    }
}
