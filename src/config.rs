//! Configuration management for the ventd daemon.
//!
//! Handles loading, parsing, and validation of the YAML configuration file
//! that defines wifi credentials, the weather location, fan behaviour,
//! display, motion lighting, battery monitoring, and the hardware driver set.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::RwLock;

use crate::speed::SpeedPolicy;

/// Main configuration structure for the ventd daemon.
///
/// Deserialized from the YAML configuration file. Every section carries
/// serde defaults so a minimal file only needs the values that differ
/// from a stock device.
///
/// # Example
///
/// ```yaml
/// version: 1
///
/// wifi:
///   ssid: "home"
///   password: "hunter2"
///
/// weather:
///   latitude: 50.9048
///   longitude: -1.4043
///
/// fan:
///   actuation: proportional
///   hysteresis_pc: 1.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Radio link credentials and retry policy.
    #[serde(default)]
    pub wifi: WifiCfg,

    /// Outdoor weather source settings.
    #[serde(default)]
    pub weather: WeatherCfg,

    /// Ventilation fan behaviour.
    #[serde(default)]
    pub fan: FanCfg,

    /// Status display settings.
    #[serde(default)]
    pub display: DisplayCfg,

    /// Motion-activated lighting.
    #[serde(default)]
    pub motion: MotionCfg,

    /// Battery voltage monitoring.
    #[serde(default)]
    pub battery: BatteryCfg,

    /// Physical buttons to watch.
    #[serde(default = "defaults::buttons")]
    pub buttons: Vec<ButtonCfg>,

    /// Hardware driver set selection.
    #[serde(default)]
    pub hardware: HardwareCfg,
}

/// Radio link configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiCfg {
    /// Network SSID to join.
    #[serde(default)]
    pub ssid: String,

    /// Network password.
    #[serde(default)]
    pub password: String,

    /// Regulatory country code.
    #[serde(default = "defaults::wifi_country")]
    pub country: String,

    /// How long a single connect attempt may poll for link-up, in seconds.
    #[serde(default = "defaults::connect_timeout_secs")]
    pub connect_timeout_secs: u16,

    /// Maximum retries after a failed attempt. -1 means retry forever.
    #[serde(default = "defaults::max_retries")]
    pub max_retries: i32,

    /// Delay between attempts, in seconds.
    #[serde(default = "defaults::retry_backoff_secs")]
    pub retry_backoff_secs: u16,
}

/// Outdoor weather source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCfg {
    /// Decimal latitude of the device location.
    #[serde(default = "defaults::latitude")]
    pub latitude: f64,

    /// Decimal longitude of the device location.
    #[serde(default = "defaults::longitude")]
    pub longitude: f64,

    /// Interval between fan state assessments, in seconds.
    #[serde(default = "defaults::poll_interval_secs")]
    pub poll_interval_secs: u32,
}

/// Ventilation fan configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanCfg {
    /// Master enable. A disabled fan never actuates.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Speed mapping strategy: proportional PWM or simple on/off.
    #[serde(default)]
    pub actuation: SpeedPolicy,

    /// How much dryer (RH %) outside must be before the fan turns on.
    #[serde(default = "defaults::hysteresis_pc")]
    pub hysteresis_pc: f64,

    /// RH % above the hysteresis threshold that maps to full speed.
    #[serde(default = "defaults::proportional_scale")]
    pub proportional_scale: f64,
}

/// Status display configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayCfg {
    /// Master enable. A disabled display turns every operation into a no-op.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Pause on a full startup page before clearing, in seconds.
    #[serde(default)]
    pub page_scroll_pause_secs: u16,

    /// Backlight idle timeout in the main phase, in seconds.
    #[serde(default = "defaults::backlight_timeout_secs")]
    pub backlight_timeout_secs: u16,
}

/// Motion-activated lighting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionCfg {
    /// Master enable for the motion tasks.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// How long after motion stops before the light turns off, in seconds.
    #[serde(default = "defaults::light_off_delay_secs")]
    pub light_off_delay_secs: u32,

    /// Light brightness while motion is detected, in percent.
    #[serde(default = "defaults::brightness_pc")]
    pub brightness_pc: f64,
}

/// Battery monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryCfg {
    /// Upper voltage divider resistor, in ohms.
    #[serde(default = "defaults::r1_ohms")]
    pub r1_ohms: f64,

    /// Lower voltage divider resistor, in ohms.
    #[serde(default = "defaults::r2_ohms")]
    pub r2_ohms: f64,

    /// Interval between voltage samples, in seconds.
    #[serde(default = "defaults::battery_poll_secs")]
    pub poll_interval_secs: u32,

    /// Calibration strategy applied to each sample.
    #[serde(default)]
    pub calibration: BatteryCalibration,
}

/// Battery calibration strategies.
///
/// The two historical formulas are not numerically equivalent, so the
/// choice is an explicit configuration value rather than a silent default:
/// `voltage-offset` adds a correction after divider scaling, `adc-offset`
/// shifts the raw sample before any scaling is applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum BatteryCalibration {
    /// Add `volts` to the scaled battery voltage.
    VoltageOffset { volts: f64 },
    /// Add `counts` to the raw ADC sample before scaling.
    AdcOffset { counts: i32 },
}

impl Default for BatteryCalibration {
    fn default() -> Self {
        Self::VoltageOffset { volts: 0.12 }
    }
}

/// A physical button bound to a GPIO line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonCfg {
    /// Human-readable name, used in logs and dispatch.
    pub name: String,

    /// GPIO line the button is wired to.
    pub gpio: u8,
}

/// Hardware driver set variants.
///
/// Selects which concrete drivers back the [`crate::hw`] traits. The
/// simulated set lets the daemon run end-to-end on a development host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum HardwareCfg {
    /// Simulated drivers for development and testing.
    Simulated {
        /// Fixed indoor relative humidity reported by the simulated sensor.
        #[serde(default = "defaults::sim_indoor_humidity")]
        indoor_humidity: f64,

        /// Fixed raw sample reported by the simulated battery ADC.
        #[serde(default = "defaults::sim_battery_adc")]
        battery_adc: u16,
    },
}

impl Default for HardwareCfg {
    fn default() -> Self {
        Self::Simulated {
            indoor_humidity: defaults::sim_indoor_humidity(),
            battery_adc: defaults::sim_battery_adc(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            wifi: WifiCfg::default(),
            weather: WeatherCfg::default(),
            fan: FanCfg::default(),
            display: DisplayCfg::default(),
            motion: MotionCfg::default(),
            battery: BatteryCfg::default(),
            buttons: defaults::buttons(),
            hardware: HardwareCfg::default(),
        }
    }
}

impl Default for WifiCfg {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            country: defaults::wifi_country(),
            connect_timeout_secs: defaults::connect_timeout_secs(),
            max_retries: defaults::max_retries(),
            retry_backoff_secs: defaults::retry_backoff_secs(),
        }
    }
}

impl Default for WeatherCfg {
    fn default() -> Self {
        Self {
            latitude: defaults::latitude(),
            longitude: defaults::longitude(),
            poll_interval_secs: defaults::poll_interval_secs(),
        }
    }
}

impl Default for FanCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            actuation: SpeedPolicy::default(),
            hysteresis_pc: defaults::hysteresis_pc(),
            proportional_scale: defaults::proportional_scale(),
        }
    }
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            page_scroll_pause_secs: 0,
            backlight_timeout_secs: defaults::backlight_timeout_secs(),
        }
    }
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            light_off_delay_secs: defaults::light_off_delay_secs(),
            brightness_pc: defaults::brightness_pc(),
        }
    }
}

impl Default for BatteryCfg {
    fn default() -> Self {
        Self {
            r1_ohms: defaults::r1_ohms(),
            r2_ohms: defaults::r2_ohms(),
            poll_interval_secs: defaults::battery_poll_secs(),
            calibration: BatteryCalibration::default(),
        }
    }
}

impl Config {
    /// Validates the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.weather.latitude) {
            anyhow::bail!("Latitude {} out of range", self.weather.latitude);
        }
        if !(-180.0..=180.0).contains(&self.weather.longitude) {
            anyhow::bail!("Longitude {} out of range", self.weather.longitude);
        }
        if self.weather.poll_interval_secs == 0 {
            anyhow::bail!("Weather poll interval must be positive");
        }
        if self.fan.hysteresis_pc < 0.0 {
            anyhow::bail!("Fan hysteresis must not be negative");
        }
        if self.fan.proportional_scale <= 0.0 {
            anyhow::bail!("Fan proportional scale must be positive");
        }
        if self.wifi.connect_timeout_secs == 0 {
            anyhow::bail!("Wifi connect timeout must be positive");
        }
        if self.battery.r1_ohms <= 0.0 || self.battery.r2_ohms <= 0.0 {
            anyhow::bail!("Battery divider resistors must be positive");
        }

        let mut names: Vec<&str> = self.buttons.iter().map(|b| b.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.buttons.len() {
            anyhow::bail!("Button names must be unique");
        }

        Ok(())
    }
}

mod defaults {
    use super::ButtonCfg;

    pub fn enabled() -> bool {
        true
    }

    pub fn wifi_country() -> String {
        "GB".to_string()
    }

    pub fn connect_timeout_secs() -> u16 {
        10
    }

    pub fn max_retries() -> i32 {
        1
    }

    pub fn retry_backoff_secs() -> u16 {
        5
    }

    pub fn latitude() -> f64 {
        50.9048
    }

    pub fn longitude() -> f64 {
        -1.4043
    }

    pub fn poll_interval_secs() -> u32 {
        300
    }

    pub fn hysteresis_pc() -> f64 {
        1.0
    }

    pub fn proportional_scale() -> f64 {
        10.0
    }

    pub fn backlight_timeout_secs() -> u16 {
        30
    }

    pub fn light_off_delay_secs() -> u32 {
        60
    }

    pub fn brightness_pc() -> f64 {
        100.0
    }

    pub fn r1_ohms() -> f64 {
        21600.0
    }

    pub fn r2_ohms() -> f64 {
        5040.0
    }

    pub fn battery_poll_secs() -> u32 {
        5
    }

    pub fn sim_indoor_humidity() -> f64 {
        55.0
    }

    pub fn sim_battery_adc() -> u16 {
        45000
    }

    /// The four face buttons of the stock front panel.
    pub fn buttons() -> Vec<ButtonCfg> {
        [("A", 12), ("B", 13), ("X", 14), ("Y", 15)]
            .into_iter()
            .map(|(name, gpio)| ButtonCfg {
                name: name.to_string(),
                gpio,
            })
            .collect()
    }
}

fn locate_config() -> Result<PathBuf> {
    // 1) ENV
    if let Ok(env_path) = env::var("VENTD_CONFIG") {
        return Ok(PathBuf::from(env_path));
    }

    // 2) XDG_CONFIG_HOME or $HOME/.config
    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("ventd/config.yml");
        if cfg_dir.exists() {
            return Ok(cfg_dir.clone());
        }
    }

    // 3) /etc
    let etc = Path::new("/etc/ventd/config.yml");
    if etc.exists() {
        return Ok(etc.to_path_buf());
    }

    anyhow::bail!("Configuration file not found in any standard location")
}

/// Configuration manager that handles both config data and file operations.
///
/// Provides a unified interface for loading, reloading, and managing
/// configuration without exposing the underlying file path to the rest of
/// the application.
///
/// # Example
///
/// ```no_run
/// use ventd::config::ConfigManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// // Load from specific path
/// let config_manager = ConfigManager::load(Some(PathBuf::from("config.yml"))).await?;
///
/// // Access configuration
/// let hysteresis = config_manager.get().await.fan.hysteresis_pc;
///
/// // Reload configuration
/// config_manager.reload().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the given config and path.
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches for configuration in the following order:
    /// 1. Provided path parameter
    /// 2. VENTD_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/ventd/config.yml or ~/.config/ventd/config.yml
    /// 4. /etc/ventd/config.yml
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => locate_config().context("No configuration file found")?,
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path).await?;

        Ok(Self::new(config, config_path))
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    /// Clones the current configuration.
    pub async fn clone_config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Returns the path to the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reloads configuration from the same file.
    ///
    /// This is how hot-reloadable configuration changes are applied.
    pub async fn reload(&self) -> Result<()> {
        info!("Reloading config from: {}", self.path.display());
        let new_config = Self::load_config_from_path(&self.path).await?;

        *self.config.write().await = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Parses and validates the on-disk file without applying it.
    ///
    /// Used by the config watcher to classify a pending change before
    /// deciding whether it can be hot-reloaded.
    pub async fn peek(&self) -> Result<Config> {
        Self::load_config_from_path(&self.path).await
    }

    /// Saves the current configuration to file.
    pub async fn save(&self) -> Result<()> {
        let config = self.config.read().await;
        let config_yaml =
            serde_yaml::to_string(&*config).context("Failed to serialize configuration")?;

        let tmp_path = self.path.with_extension("yml.tmp");
        fs::write(&tmp_path, config_yaml).with_context(|| {
            format!("Failed to write temporary config to {}", tmp_path.display())
        })?;
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!("Failed to move config into place at {}", self.path.display())
        })?;

        Ok(())
    }

    async fn load_config_from_path(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate().context("Invalid configuration")?;

        Ok(config)
    }
}
