//! Humidity assessment and fan actuation.
//!
//! Each assessment gathers the indoor reading and the outdoor forecast,
//! asks the configured speed policy for a decision, and drives the PWM
//! actuator. Missing data on either side means the controller cannot prove
//! the air is dry, so it falls back to full speed.

use std::sync::Arc;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::sync::RwLock;

use crate::{
    config::ConfigManager,
    connectivity::ConnectivityManager,
    display::{self, DisplayManager},
    event::{Event, EventBus},
    hw::{HumiditySensor, PwmOutput, StatusLed},
    weather::WeatherSource,
};

/// Speed applied whenever an assessment cannot complete.
const FAIL_SAFE_SPEED: f64 = 1.0;

#[derive(Debug, Default, Clone, Copy)]
struct FanState {
    indoor: Option<f64>,
    outdoor: Option<f64>,
    speed: f64,
}

pub struct FanController {
    connectivity: Arc<ConnectivityManager>,
    weather: Arc<dyn WeatherSource>,
    sensor: Arc<dyn HumiditySensor>,
    actuator: Arc<dyn PwmOutput>,
    display: Arc<DisplayManager>,
    led: StatusLed,
    bus: EventBus,
    config_manager: ConfigManager,
    state: RwLock<FanState>,
}

impl FanController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connectivity: Arc<ConnectivityManager>,
        weather: Arc<dyn WeatherSource>,
        sensor: Arc<dyn HumiditySensor>,
        actuator: Arc<dyn PwmOutput>,
        display: Arc<DisplayManager>,
        led: StatusLed,
        bus: EventBus,
        config_manager: ConfigManager,
    ) -> Self {
        Self {
            connectivity,
            weather,
            sensor,
            actuator,
            display,
            led,
            bus,
            config_manager,
            state: RwLock::new(FanState::default()),
        }
    }

    /// Indoor humidity from the most recent assessment.
    pub async fn latest_indoor_humidity(&self) -> Option<f64> {
        self.state.read().await.indoor
    }

    /// Outdoor humidity from the most recent assessment.
    pub async fn latest_outdoor_humidity(&self) -> Option<f64> {
        self.state.read().await.outdoor
    }

    /// Current actuator speed in [0.0, 1.0].
    pub async fn current_speed(&self) -> f64 {
        self.state.read().await.speed
    }

    /// Runs one assessment cycle.
    pub async fn assess(&self) -> Result<()> {
        self.led.flash(4, 4.0);

        // Tunables are re-read every cycle so hot reloads apply here.
        let (fan_cfg, wifi_cfg) = {
            let config = self.config_manager.get().await;
            (config.fan.clone(), config.wifi.clone())
        };

        let network_up = match self.connectivity.check_network_access(&wifi_cfg).await {
            Ok(up) => up,
            Err(e) => {
                warn!("Network check failed: {e}");
                false
            }
        };

        let outdoor = if network_up {
            match self.weather.outdoor_humidity().await {
                Ok(sample) => sample,
                Err(e) => {
                    warn!("Weather fetch failed: {e}");
                    None
                }
            }
        } else {
            None
        };

        let indoor = match self.sensor.read().await {
            Ok(reading) => Some(reading.humidity),
            Err(e) => {
                warn!("Humidity sensor read failed: {e}");
                None
            }
        };

        {
            // Accessors keep serving the last good reading across a failed
            // poll; only a fresh sample replaces it.
            let mut state = self.state.write().await;
            if indoor.is_some() {
                state.indoor = indoor;
            }
            if outdoor.is_some() {
                state.outdoor = outdoor;
            }
        }
        self.display
            .update_status(&[
                (display::KEY_INDOOR_HUMIDITY, humidity_text(indoor)),
                (display::KEY_OUTDOOR_HUMIDITY, humidity_text(outdoor)),
            ])
            .await?;
        self.bus.publish(Event::HumidityAssessed { indoor, outdoor });

        match (indoor, outdoor) {
            (Some(indoor), Some(outdoor)) => {
                let decision = fan_cfg.actuation.required_speed(
                    indoor,
                    outdoor,
                    fan_cfg.hysteresis_pc,
                    fan_cfg.proportional_scale,
                );
                debug!(
                    "Assessment: indoor {indoor:.1}% outdoor {outdoor:.1}% -> {decision:?}"
                );
                match decision {
                    Some(speed) => self.set_speed(speed).await?,
                    None => debug!("Inside hysteresis band, holding current speed"),
                }
            }
            _ => {
                warn!("Humidity data incomplete, running fan at full speed");
                self.set_speed(FAIL_SAFE_SPEED).await?;
            }
        }
        Ok(())
    }

    /// Applies `speed` to the actuator; repeated identical speeds are not
    /// re-applied.
    pub async fn set_speed(&self, speed: f64) -> Result<()> {
        let speed = speed.clamp(0.0, 1.0);
        {
            let state = self.state.read().await;
            if (state.speed - speed).abs() < f64::EPSILON {
                debug!("Fan speed unchanged at {speed:.2}");
                return Ok(());
            }
        }

        let duty = (f64::from(self.actuator.max_duty()) * speed).round() as u16;
        info!("Fan speed {speed:.2} (duty {duty})");
        self.actuator.set_duty(duty).await?;
        self.state.write().await.speed = speed;

        self.display
            .update_status(&[(display::KEY_FAN_SPEED, format!("{:.0}%", speed * 100.0))])
            .await?;
        self.bus.publish(Event::FanSpeedChanged(speed));
        Ok(())
    }
}

fn humidity_text(sample: Option<f64>) -> String {
    match sample {
        Some(pc) => format!("{pc:.1}"),
        None => "?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DisplayCfg};
    use crate::hw::{ClimateReading, MockRadio, StatusLedDriver};
    use crate::speed::SpeedPolicy;
    use crate::weather::MockWeatherSource;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;

    struct FakeSensor {
        humidity: StdMutex<Result<f64, ()>>,
    }

    impl FakeSensor {
        fn reading(humidity: f64) -> Arc<Self> {
            Arc::new(Self {
                humidity: StdMutex::new(Ok(humidity)),
            })
        }

        fn set(&self, humidity: f64) {
            *self.humidity.lock().unwrap() = Ok(humidity);
        }
    }

    #[async_trait]
    impl HumiditySensor for FakeSensor {
        async fn read(&self) -> Result<ClimateReading> {
            match *self.humidity.lock().unwrap() {
                Ok(humidity) => Ok(ClimateReading {
                    temperature: 21.0,
                    pressure: 1013.25,
                    humidity,
                }),
                Err(()) => anyhow::bail!("sensor offline"),
            }
        }
    }

    struct RecordingPwm {
        duties: StdMutex<Vec<u16>>,
    }

    impl RecordingPwm {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                duties: StdMutex::new(Vec::new()),
            })
        }

        fn duties(&self) -> Vec<u16> {
            self.duties.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PwmOutput for RecordingPwm {
        fn max_duty(&self) -> u16 {
            u16::MAX
        }

        async fn set_duty(&self, duty: u16) -> Result<()> {
            self.duties.lock().unwrap().push(duty);
            Ok(())
        }
    }

    fn disabled_display() -> Arc<DisplayManager> {
        let panel = Arc::new(crate::hw::MockDisplayPanel::new());
        Arc::new(DisplayManager::new(
            panel,
            &DisplayCfg {
                enabled: false,
                page_scroll_pause_secs: 0,
                backlight_timeout_secs: 30,
            },
        ))
    }

    fn connectivity(up: bool) -> Arc<ConnectivityManager> {
        let mut radio = MockRadio::new();
        // An up radio short-circuits the access check; a dead one reports
        // no network on every read and the bounded retries fail fast.
        radio
            .expect_status()
            .returning(move || Ok(if up { 3 } else { -2 }));
        radio.expect_connect().returning(|_, _| Ok(()));
        let (led, _driver) = StatusLedDriver::new(Arc::new(crate::hw::MockDigitalOutput::new()));
        Arc::new(ConnectivityManager::new(
            Arc::new(radio),
            disabled_display(),
            led,
            EventBus::new(),
        ))
    }

    struct Rig {
        controller: FanController,
        sensor: Arc<FakeSensor>,
        pwm: Arc<RecordingPwm>,
        bus: EventBus,
    }

    fn rig(policy: SpeedPolicy, indoor: f64, outdoor: Option<f64>, network_up: bool) -> Rig {
        let mut config = Config::default();
        config.fan.actuation = policy;
        config.fan.hysteresis_pc = 1.0;
        config.fan.proportional_scale = 10.0;
        config.wifi.max_retries = 0;
        config.wifi.retry_backoff_secs = 0;

        let mut weather = MockWeatherSource::new();
        weather
            .expect_outdoor_humidity()
            .returning(move || Ok(outdoor));

        let sensor = FakeSensor::reading(indoor);
        let pwm = RecordingPwm::new();
        let bus = EventBus::new();
        let (led, _driver) = StatusLedDriver::new(Arc::new(crate::hw::MockDigitalOutput::new()));

        let controller = FanController::new(
            connectivity(network_up),
            Arc::new(weather),
            sensor.clone(),
            pwm.clone(),
            disabled_display(),
            led,
            bus.clone(),
            ConfigManager::new(config, PathBuf::from("/dev/null")),
        );
        Rig {
            controller,
            sensor,
            pwm,
            bus,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn damp_room_runs_proportional_speed() {
        let rig = rig(SpeedPolicy::Proportional, 60.0, Some(50.0), true);

        rig.controller.assess().await.expect("assess");

        assert_eq!(rig.controller.current_speed().await, 0.9);
        let expected_duty = (f64::from(u16::MAX) * 0.9).round() as u16;
        assert_eq!(rig.pwm.duties(), vec![expected_duty]);
        assert_eq!(rig.controller.latest_indoor_humidity().await, Some(60.0));
        assert_eq!(rig.controller.latest_outdoor_humidity().await, Some(50.0));
    }

    #[tokio::test(start_paused = true)]
    async fn equal_humidity_stops_the_fan() {
        let rig = rig(SpeedPolicy::Proportional, 50.0, Some(50.0), true);

        rig.controller.set_speed(0.5).await.expect("preset");
        rig.controller.assess().await.expect("assess");

        assert_eq!(rig.controller.current_speed().await, 0.0);
        assert_eq!(rig.pwm.duties().last(), Some(&0));
    }

    #[tokio::test(start_paused = true)]
    async fn hysteresis_band_holds_previous_speed() {
        let rig = rig(SpeedPolicy::Proportional, 60.0, Some(50.0), true);

        rig.controller.assess().await.expect("first assess");
        assert_eq!(rig.controller.current_speed().await, 0.9);

        // 50.5 sits between outdoor and outdoor + hysteresis.
        rig.sensor.set(50.5);
        rig.controller.assess().await.expect("second assess");

        assert_eq!(rig.controller.current_speed().await, 0.9);
        assert_eq!(rig.pwm.duties().len(), 1, "no second actuation");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_keeps_the_last_good_readings() {
        let mut config = Config::default();
        config.fan.actuation = SpeedPolicy::Proportional;
        config.wifi.max_retries = 0;
        config.wifi.retry_backoff_secs = 0;

        // The forecast succeeds once, then the service goes dark.
        let mut weather = MockWeatherSource::new();
        weather
            .expect_outdoor_humidity()
            .times(1)
            .returning(|| Ok(Some(50.0)));
        weather.expect_outdoor_humidity().returning(|| Ok(None));

        let sensor = FakeSensor::reading(60.0);
        let (led, _driver) = StatusLedDriver::new(Arc::new(crate::hw::MockDigitalOutput::new()));
        let controller = FanController::new(
            connectivity(true),
            Arc::new(weather),
            sensor,
            RecordingPwm::new(),
            disabled_display(),
            led,
            EventBus::new(),
            ConfigManager::new(config, PathBuf::from("/dev/null")),
        );

        controller.assess().await.expect("first assess");
        assert_eq!(controller.latest_outdoor_humidity().await, Some(50.0));

        controller.assess().await.expect("second assess");

        // The failed poll fail-safes the fan but the snapshot accessors
        // keep the stale-but-valid readings.
        assert_eq!(controller.current_speed().await, 1.0);
        assert_eq!(controller.latest_outdoor_humidity().await, Some(50.0));
        assert_eq!(controller.latest_indoor_humidity().await, Some(60.0));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_forecast_forces_full_speed() {
        let rig = rig(SpeedPolicy::Proportional, 40.0, None, true);

        rig.controller.assess().await.expect("assess");

        assert_eq!(rig.controller.current_speed().await, 1.0);
        assert_eq!(rig.pwm.duties(), vec![u16::MAX]);
        assert_eq!(rig.controller.latest_outdoor_humidity().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn network_down_forces_full_speed() {
        let rig = rig(SpeedPolicy::Proportional, 40.0, Some(80.0), false);

        rig.controller.assess().await.expect("assess");

        // The forecast was never consulted: no network, no outdoor data.
        assert_eq!(rig.controller.current_speed().await, 1.0);
        assert_eq!(rig.controller.latest_outdoor_humidity().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn binary_policy_actuates_full_or_stopped() {
        let rig = rig(SpeedPolicy::Binary, 60.0, Some(50.0), true);

        rig.controller.assess().await.expect("assess");
        assert_eq!(rig.controller.current_speed().await, 1.0);

        rig.sensor.set(45.0);
        rig.controller.assess().await.expect("assess");
        assert_eq!(rig.controller.current_speed().await, 0.0);
        assert_eq!(rig.pwm.duties(), vec![u16::MAX, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn assessment_publishes_humidity_and_speed() {
        let rig = rig(SpeedPolicy::Proportional, 60.0, Some(50.0), true);
        let mut events = rig.bus.subscribe();

        rig.controller.assess().await.expect("assess");

        assert!(matches!(
            events.recv().await.expect("event"),
            Event::HumidityAssessed {
                indoor: Some(i),
                outdoor: Some(o),
            } if i == 60.0 && o == 50.0
        ));
        assert!(matches!(
            events.recv().await.expect("event"),
            Event::FanSpeedChanged(speed) if speed == 0.9
        ));
    }
}
