//! Shared application state wiring the managers to their hardware.
//!
//! [`AppState`] is built once at startup: it constructs the driver set
//! named by the configuration and hands each resource to exactly one
//! manager. Services receive the state as `Arc<AppState>` and reach their
//! collaborators through its typed handles, never through a registry.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::{
    battery::BatteryMonitor,
    button::Button,
    config::{Config, ConfigManager},
    connectivity::ConnectivityManager,
    display::DisplayManager,
    drivers,
    event::EventBus,
    fan::FanController,
    hw::StatusLedDriver,
    light::Light,
    motion::MotionManager,
    weather::OpenMeteoClient,
};

pub struct AppState {
    config_manager: ConfigManager,
    bus: EventBus,
    pub connectivity: Arc<ConnectivityManager>,
    pub fan: Arc<FanController>,
    pub display: Arc<DisplayManager>,
    pub motion: Arc<MotionManager>,
    pub light: Arc<Light>,
    pub battery: Arc<BatteryMonitor>,
    pub buttons: Vec<Arc<Button>>,
    /// Held until the LED service claims it.
    led_driver: Mutex<Option<StatusLedDriver>>,
}

impl AppState {
    pub async fn new(config_manager: ConfigManager, bus: EventBus) -> Result<Self> {
        let config = config_manager.clone_config().await;
        let hw = drivers::build(&config).context("Failed to build hardware drivers")?;

        let (led, led_driver) = StatusLedDriver::new(hw.status_led);
        let display = Arc::new(DisplayManager::new(hw.panel, &config.display));
        let connectivity = Arc::new(ConnectivityManager::new(
            hw.radio,
            display.clone(),
            led.clone(),
            bus.clone(),
        ));
        let weather = Arc::new(OpenMeteoClient::new(&config.weather));
        let fan = Arc::new(FanController::new(
            connectivity.clone(),
            weather,
            hw.sensor,
            hw.fan_pwm,
            display.clone(),
            led,
            bus.clone(),
            config_manager.clone(),
        ));
        let light = Arc::new(Light::new(hw.light_pwm, config.motion.brightness_pc));
        let motion = Arc::new(MotionManager::new(
            hw.pir,
            light.clone(),
            config_manager.clone(),
            bus.clone(),
            config.motion.enabled,
        ));
        let battery = Arc::new(BatteryMonitor::new(
            hw.battery_adc,
            config_manager.clone(),
            display.clone(),
            bus.clone(),
        ));
        let buttons = hw
            .buttons
            .into_iter()
            .map(|(name, pin)| Arc::new(Button::new(name, pin, bus.clone())))
            .collect();

        Ok(Self {
            config_manager,
            bus,
            connectivity,
            fan,
            display,
            motion,
            light,
            battery,
            buttons,
            led_driver: Mutex::new(Some(led_driver)),
        })
    }

    pub fn config_manager(&self) -> &ConfigManager {
        &self.config_manager
    }

    pub async fn config(&self) -> Config {
        self.config_manager.clone_config().await
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn button(&self, name: &str) -> Option<&Arc<Button>> {
        self.buttons.iter().find(|b| b.name() == name)
    }

    /// Takes ownership of the status LED driver; only the LED service may
    /// call this, and only once.
    pub async fn take_led_driver(&self) -> Option<StatusLedDriver> {
        self.led_driver.lock().await.take()
    }
}
