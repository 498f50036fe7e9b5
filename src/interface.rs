//! D-Bus control surface.
//!
//! Exposes the live readings and runtime toggles at
//! `io.github.ventd` / `/io/github/ventd`. Missing readings surface as NaN
//! so properties stay plain doubles.

use std::sync::Arc;

use log::{error, info};
use zbus::{interface, object_server::SignalEmitter};

use crate::{
    app_context::AppState,
    event::{Event, EventBus},
};

pub struct StatusInterface {
    state: Arc<AppState>,
    bus: EventBus,
    version: String,
}

impl StatusInterface {
    pub fn new(state: Arc<AppState>, bus: EventBus, version: String) -> Self {
        Self {
            state,
            bus,
            version,
        }
    }
}

#[interface(name = "io.github.ventd1")]
impl StatusInterface {
    /// Emitted whenever a status field changes.
    #[zbus(signal)]
    pub async fn status_changed(
        emitter: &SignalEmitter<'_>,
        field: &str,
        value: &str,
    ) -> zbus::Result<()>;

    /// Requests a clean daemon shutdown.
    async fn stop(&self) {
        info!("Shutdown requested over D-Bus");
        self.bus.publish(Event::SystemShutdown);
    }

    async fn set_light_brightness(&self, brightness_pc: f64) {
        if let Err(e) = self.state.light.set_brightness(brightness_pc).await {
            error!("Failed to set light brightness: {e}");
        }
    }

    async fn enable_motion(&self) {
        self.state.motion.enable().await;
    }

    async fn disable_motion(&self) {
        self.state.motion.disable().await;
    }

    #[zbus(property)]
    async fn version(&self) -> String {
        self.version.clone()
    }

    #[zbus(property)]
    async fn indoor_humidity(&self) -> f64 {
        self.state
            .fan
            .latest_indoor_humidity()
            .await
            .unwrap_or(f64::NAN)
    }

    #[zbus(property)]
    async fn outdoor_humidity(&self) -> f64 {
        self.state
            .fan
            .latest_outdoor_humidity()
            .await
            .unwrap_or(f64::NAN)
    }

    #[zbus(property)]
    async fn fan_speed(&self) -> f64 {
        self.state.fan.current_speed().await
    }

    #[zbus(property)]
    async fn battery_voltage(&self) -> f64 {
        self.state
            .battery
            .latest()
            .await
            .map_or(f64::NAN, |r| r.volts)
    }

    #[zbus(property)]
    async fn connectivity_status(&self) -> String {
        self.state.connectivity.status().await.label().to_string()
    }

    #[zbus(property)]
    async fn mac_address(&self) -> String {
        self.state.connectivity.mac()
    }

    #[zbus(property)]
    async fn light_on(&self) -> bool {
        self.state.light.is_on().await
    }

    #[zbus(property)]
    async fn light_brightness(&self) -> f64 {
        self.state.light.brightness_pc().await
    }

    #[zbus(property)]
    async fn motion_enabled(&self) -> bool {
        self.state.motion.is_enabled().await
    }
}
