//! Display manager: the single owner of the physical display.
//!
//! The display has two lifecycle phases. During startup it shows a log of
//! configuration lines with automatic pagination; once the orchestrator is
//! done it flips one-way to the main phase, a fixed-order status table kept
//! current by the other managers through [`DisplayManager::update_status`].
//! A disabled display degrades every operation to a logged no-op so callers
//! need no conditional logic.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{debug, info, warn};
use tokio::{sync::Mutex, time::Instant};

use crate::{config::DisplayCfg, hw::DisplayPanel};

/// Status table keys accepted by [`DisplayManager::update_status`].
pub const KEY_INDOOR_HUMIDITY: &str = "indoor_humidity";
pub const KEY_OUTDOOR_HUMIDITY: &str = "outdoor_humidity";
pub const KEY_FAN_SPEED: &str = "fan_speed";
pub const KEY_WIFI_STATUS: &str = "wifi_status";
pub const KEY_BATTERY_VOLTAGE: &str = "battery_voltage";
pub const KEY_WEB_SERVER: &str = "web_server";

/// Interval of the backlight timeout check loop.
const BACKLIGHT_POLL: Duration = Duration::from_millis(100);

/// Display lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Startup,
    Main,
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    height: u32,
    usable_width: u32,
    font_height: u32,
    line_spacing: u32,
    top_margin: u32,
    left_margin: u32,
    bottom_margin: u32,
    header_scale: u32,
    normal_scale: u32,
}

impl Geometry {
    fn for_panel(panel: &dyn DisplayPanel) -> Self {
        let (width, height) = panel.bounds();
        let left_margin = 10;
        Self {
            height,
            usable_width: width - left_margin,
            font_height: 8,
            line_spacing: 2,
            top_margin: 10,
            left_margin,
            bottom_margin: 0,
            header_scale: 3,
            normal_scale: 2,
        }
    }

    /// Vertical pixels one table entry of `lines` wrapped lines occupies.
    fn entry_height(&self, lines: u32) -> u32 {
        (self.font_height * self.normal_scale + self.line_spacing) * lines
    }
}

struct PageState {
    mode: DisplayMode,
    cursor_y: u32,
}

struct BacklightState {
    /// Some while the backlight is lit; refreshed on every `backlight_on`.
    on_since: Option<Instant>,
}

struct StatusField {
    key: &'static str,
    label: &'static str,
    value: String,
}

struct Inner {
    panel: Arc<dyn DisplayPanel>,
    geom: Geometry,
    page_pause: Duration,
    backlight_timeout: Duration,
    state: Mutex<PageState>,
    backlight: Mutex<BacklightState>,
    table: Mutex<Vec<StatusField>>,
}

/// Serializes all access to the display resource.
pub struct DisplayManager {
    inner: Option<Inner>,
}

impl DisplayManager {
    /// Creates the manager; a disabled config yields a no-op manager.
    pub fn new(panel: Arc<dyn DisplayPanel>, cfg: &DisplayCfg) -> Self {
        if !cfg.enabled {
            info!("Display disabled in config");
            return Self { inner: None };
        }

        let geom = Geometry::for_panel(panel.as_ref());
        let table = [
            (KEY_INDOOR_HUMIDITY, "IHum"),
            (KEY_OUTDOOR_HUMIDITY, "OHum"),
            (KEY_FAN_SPEED, "Fan"),
            (KEY_WIFI_STATUS, "Net"),
            (KEY_BATTERY_VOLTAGE, "Batt"),
            (KEY_WEB_SERVER, "Web"),
        ]
        .into_iter()
        .map(|(key, label)| StatusField {
            key,
            label,
            value: "Unknown".to_string(),
        })
        .collect();

        Self {
            inner: Some(Inner {
                panel,
                geom,
                page_pause: Duration::from_secs(u64::from(cfg.page_scroll_pause_secs)),
                backlight_timeout: Duration::from_secs(u64::from(cfg.backlight_timeout_secs)),
                state: Mutex::new(PageState {
                    mode: DisplayMode::Startup,
                    cursor_y: geom.top_margin,
                }),
                backlight: Mutex::new(BacklightState { on_since: None }),
                table: Mutex::new(table),
            }),
        }
    }

    /// Whether the physical display is administratively enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Paints the startup header and lights the backlight.
    pub async fn init(&self) -> Result<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        info!("Startup display");
        self.backlight_on().await?;

        let mut state = inner.state.lock().await;
        inner.panel.clear().await?;
        state.cursor_y = inner.geom.top_margin;
        inner
            .panel
            .draw_text(
                "Starting up...",
                inner.geom.left_margin,
                state.cursor_y,
                inner.geom.usable_width,
                inner.geom.header_scale,
            )
            .await?;
        inner.panel.flush().await?;
        state.cursor_y +=
            inner.geom.header_scale * inner.geom.font_height + inner.geom.line_spacing;

        Ok(())
    }

    /// Appends one line to the startup log, paginating when the viewport
    /// is full: pause so the page can be read, clear, reset to the top.
    pub async fn add_startup_line(&self, text: &str) -> Result<()> {
        let Some(inner) = &self.inner else {
            debug!("Display disabled, dropping startup line: {text}");
            return Ok(());
        };

        let mut state = inner.state.lock().await;
        if state.mode != DisplayMode::Startup {
            debug!("Ignoring startup line in main mode: {text}");
            return Ok(());
        }

        // Wrapped text reserves vertical space for every line it will take.
        let lines = line_count(
            inner.panel.measure_text(text, inner.geom.normal_scale),
            inner.geom.usable_width,
        );
        let entry_height = inner.geom.entry_height(lines);

        if state.cursor_y + entry_height > inner.geom.height - inner.geom.bottom_margin {
            tokio::time::sleep(inner.page_pause).await;
            inner.panel.clear().await?;
            state.cursor_y = inner.geom.top_margin;
        }

        inner
            .panel
            .draw_text(
                text,
                inner.geom.left_margin,
                state.cursor_y,
                inner.geom.usable_width,
                inner.geom.normal_scale,
            )
            .await?;
        inner.panel.flush().await?;
        state.cursor_y += entry_height;

        Ok(())
    }

    /// Merges `updates` into the status table. Unknown keys are dropped
    /// with a warning; known keys trigger a full redraw in main mode.
    pub async fn update_status(&self, updates: &[(&str, String)]) -> Result<()> {
        let Some(inner) = &self.inner else {
            debug!("Display disabled, dropping status update");
            return Ok(());
        };

        {
            let mut table = inner.table.lock().await;
            for (key, value) in updates {
                match table.iter_mut().find(|field| field.key == *key) {
                    Some(field) => {
                        debug!("Status field {key} set to {value}");
                        field.value = value.clone();
                    }
                    None => warn!("Invalid status update key: {key}"),
                }
            }
        }

        let state = inner.state.lock().await;
        if state.mode == DisplayMode::Main {
            self.redraw_main(inner).await?;
        }

        Ok(())
    }

    /// One-way transition from the startup log to the live status page.
    pub async fn set_main_mode(&self) -> Result<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        {
            let mut state = inner.state.lock().await;
            if state.mode == DisplayMode::Main {
                return Ok(());
            }
            state.mode = DisplayMode::Main;
        }
        info!("Display switched to main mode");
        self.redraw_main(inner).await
    }

    /// Current lifecycle phase; `Main` when the display is disabled.
    pub async fn mode(&self) -> DisplayMode {
        match &self.inner {
            Some(inner) => inner.state.lock().await.mode,
            None => DisplayMode::Main,
        }
    }

    async fn redraw_main(&self, inner: &Inner) -> Result<()> {
        inner.panel.clear().await?;

        let table = inner.table.lock().await;
        let mut y = inner.geom.top_margin;
        for field in table.iter() {
            let text = format!("{}: {}", field.label, field.value);
            inner
                .panel
                .draw_text(
                    &text,
                    inner.geom.left_margin,
                    y,
                    inner.geom.usable_width,
                    inner.geom.normal_scale,
                )
                .await?;
            y += inner.geom.entry_height(1);
        }
        inner.panel.flush().await
    }

    /// Lights the backlight and (re)starts the idle timeout.
    pub async fn backlight_on(&self) -> Result<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        let mut backlight = inner.backlight.lock().await;
        if backlight.on_since.is_none() {
            debug!("Backlight on");
            inner.panel.set_backlight(1.0).await?;
        }
        backlight.on_since = Some(Instant::now());
        Ok(())
    }

    /// Switches the backlight off.
    pub async fn backlight_off(&self) -> Result<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        debug!("Backlight off");
        inner.panel.set_backlight(0.0).await?;
        inner.backlight.lock().await.on_since = None;
        Ok(())
    }

    /// Whether the backlight is currently lit. Always true when disabled so
    /// button handlers behave the same on headless devices.
    pub async fn backlight_is_on(&self) -> bool {
        match &self.inner {
            Some(inner) => inner.backlight.lock().await.on_since.is_some(),
            None => true,
        }
    }

    async fn backlight_expired(&self) -> bool {
        let Some(inner) = &self.inner else {
            return false;
        };

        // Startup always keeps the backlight on.
        if inner.state.lock().await.mode != DisplayMode::Main {
            return false;
        }

        inner
            .backlight
            .lock()
            .await
            .on_since
            .is_some_and(|since| since.elapsed() >= inner.backlight_timeout)
    }

    /// Backlight idle timeout loop; returns immediately when disabled.
    pub async fn run_backlight_timeout(&self) -> Result<()> {
        if self.inner.is_none() {
            info!("Display not enabled - backlight monitor not started");
            return Ok(());
        }

        info!("Starting backlight timeout management");
        loop {
            if self.backlight_expired().await {
                info!("Backlight timeout exceeded");
                self.backlight_off().await?;
            }
            tokio::time::sleep(BACKLIGHT_POLL).await;
        }
    }
}

/// Number of wrapped lines a run of `text_width` pixels occupies.
fn line_count(text_width: u32, usable_width: u32) -> u32 {
    let mut lines = 1;
    let mut remaining = text_width;
    while remaining > usable_width {
        remaining -= usable_width;
        lines += 1;
    }
    lines
}
