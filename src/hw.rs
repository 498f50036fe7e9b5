//! Hardware driver interfaces consumed by the managers.
//!
//! The physical bindings live behind these traits so the control logic is
//! testable and driver sets are swappable from configuration. Each resource
//! has exactly one owning manager; the traits are read/write primitives
//! only and carry no policy.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info};
use tokio::sync::mpsc;

/// One sample from the combined climate sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Hectopascals.
    pub pressure: f64,
    /// Relative humidity percent.
    pub humidity: f64,
}

/// Network configuration reported by the radio after link-up.
#[derive(Debug, Clone, PartialEq)]
pub struct IfConfig {
    pub ip: String,
    pub subnet: String,
    pub gateway: String,
    pub dns: String,
}

/// Combined temperature/pressure/humidity sensor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HumiditySensor: Send + Sync {
    async fn read(&self) -> Result<ClimateReading>;
}

/// A small pixel display with a dimmable backlight.
///
/// Drawing is buffered; nothing reaches the panel until [`flush`].
///
/// [`flush`]: DisplayPanel::flush
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DisplayPanel: Send + Sync {
    /// Viewport size in pixels as (width, height).
    fn bounds(&self) -> (u32, u32);

    /// Pixel width of `text` at the given font scale, before wrapping.
    fn measure_text(&self, text: &str, scale: u32) -> u32;

    async fn clear(&self) -> Result<()>;

    /// Draws `text` at (x, y), wrapping at `wrap_width` pixels.
    async fn draw_text(&self, text: &str, x: u32, y: u32, wrap_width: u32, scale: u32)
    -> Result<()>;

    async fn flush(&self) -> Result<()>;

    /// Backlight level in [0.0, 1.0].
    async fn set_backlight(&self, level: f64) -> Result<()>;
}

/// The wireless radio link.
///
/// `status` returns the raw driver code; the connectivity manager owns the
/// mapping to link states.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Radio: Send + Sync {
    async fn connect(&self, ssid: &str, password: &str) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn status(&self) -> Result<i8>;

    async fn ifconfig(&self) -> Result<IfConfig>;

    fn mac(&self) -> String;
}

/// A PWM output channel (fan actuator, dimmable light).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PwmOutput: Send + Sync {
    fn max_duty(&self) -> u16;

    async fn set_duty(&self, duty: u16) -> Result<()>;
}

/// A digital input line (PIR sensor, buttons).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DigitalInput: Send + Sync {
    /// Current level; true is high.
    async fn level(&self) -> Result<bool>;
}

/// A digital output line (status LED).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DigitalOutput: Send + Sync {
    async fn set_level(&self, high: bool) -> Result<()>;
}

/// An analog input channel (battery voltage divider).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdcInput: Send + Sync {
    /// Raw 16-bit sample.
    async fn read_raw(&self) -> Result<u16>;
}

/// A request for the status LED to blink `count` times at `hz`.
#[derive(Debug, Clone, Copy)]
struct Flash {
    count: u32,
    hz: f64,
}

/// Cheap handle for signalling on the shared status LED.
///
/// The LED is a single physical resource signalled from several managers,
/// so requests are serialized through one arbitrating driver task instead
/// of handing the pin around. `flash` never blocks the caller.
#[derive(Debug, Clone)]
pub struct StatusLed {
    tx: mpsc::UnboundedSender<Flash>,
}

impl StatusLed {
    /// Queues a blink pattern: `count` toggles at `hz`.
    ///
    /// Short fast patterns signal success, long slow ones signal trouble.
    pub fn flash(&self, count: u32, hz: f64) {
        if self.tx.send(Flash { count, hz }).is_err() {
            error!("Status LED driver task is gone, dropping flash request");
        }
    }
}

/// Owns the status LED pin and plays queued blink patterns in order.
pub struct StatusLedDriver {
    out: Arc<dyn DigitalOutput>,
    rx: mpsc::UnboundedReceiver<Flash>,
}

impl StatusLedDriver {
    /// Creates the driver and a cloneable [`StatusLed`] handle for it.
    pub fn new(out: Arc<dyn DigitalOutput>) -> (StatusLed, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StatusLed { tx }, Self { out, rx })
    }

    /// Plays flash requests until every handle is dropped.
    pub async fn run(mut self) -> Result<()> {
        info!("Status LED driver started");
        while let Some(flash) = self.rx.recv().await {
            if let Err(e) = self.play(flash).await {
                error!("Status LED write failed: {e}");
            }
        }
        Ok(())
    }

    async fn play(&self, flash: Flash) -> Result<()> {
        let half_period = Duration::from_secs_f64((1.0 / flash.hz) / 2.0);

        self.out.set_level(false).await?;
        for _ in 0..flash.count {
            tokio::time::sleep(half_period).await;
            self.out.set_level(true).await?;
            tokio::time::sleep(half_period).await;
            self.out.set_level(false).await?;
        }
        Ok(())
    }
}
