//! PWM light with perceptual brightness correction.
//!
//! Brightness is configured in percent; the duty cycle applies a square-law
//! correction so mid-range settings look mid-bright to the eye rather than
//! nearly full on.

use std::sync::Arc;

use anyhow::Result;
use log::{debug, info};
use tokio::sync::RwLock;

use crate::hw::PwmOutput;

pub struct Light {
    pwm: Arc<dyn PwmOutput>,
    brightness_pc: RwLock<f64>,
    lit: RwLock<bool>,
}

impl Light {
    pub fn new(pwm: Arc<dyn PwmOutput>, brightness_pc: f64) -> Self {
        Self {
            pwm,
            brightness_pc: RwLock::new(brightness_pc.clamp(0.0, 100.0)),
            lit: RwLock::new(false),
        }
    }

    /// Switches the light on at the configured brightness.
    pub async fn on(&self) -> Result<()> {
        let brightness = *self.brightness_pc.read().await;
        debug!("Light on at {brightness}%");
        self.pwm.set_duty(self.duty_for(brightness)).await?;
        *self.lit.write().await = true;
        Ok(())
    }

    pub async fn off(&self) -> Result<()> {
        debug!("Light off");
        self.pwm.set_duty(0).await?;
        *self.lit.write().await = false;
        Ok(())
    }

    pub async fn is_on(&self) -> bool {
        *self.lit.read().await
    }

    pub async fn brightness_pc(&self) -> f64 {
        *self.brightness_pc.read().await
    }

    /// Updates the brightness, reapplying it immediately when lit.
    pub async fn set_brightness(&self, pc: f64) -> Result<()> {
        let pc = pc.clamp(0.0, 100.0);
        info!("Light brightness set to {pc}%");
        *self.brightness_pc.write().await = pc;

        if *self.lit.read().await {
            self.pwm.set_duty(self.duty_for(pc)).await?;
        }
        Ok(())
    }

    fn duty_for(&self, brightness_pc: f64) -> u16 {
        let fraction = brightness_pc / 100.0;
        (f64::from(self.pwm.max_duty()) * fraction * fraction).round() as u16
    }
}
