//! Configuration file watcher service provider.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use notify::{EventHandler, RecursiveMode, Watcher, recommended_watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    config::{Config, ConfigManager},
    event::{ConfigChangeType, Event as AppEvent, EventBus},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Sections whose changes apply without touching hardware or restarting
/// service loops.
const HOT_SECTIONS: &[&str] = &["fan", "motion"];

/// Quiet period after the last filesystem event before analysis runs.
const DEBOUNCE: Duration = Duration::from_millis(2000);

/// Watches the configuration file and classifies detected changes.
///
/// Hot-reloadable changes are applied in place; anything touching hardware
/// bindings or service cadence is announced as requiring a restart.
pub struct ConfigWatcherServiceProvider {
    state: Arc<AppState>,
    bus: EventBus,
}

impl ConfigWatcherServiceProvider {
    pub fn new(state: Arc<AppState>, bus: EventBus) -> Self {
        Self { state, bus }
    }
}

#[async_trait]
impl ServiceProvider for ConfigWatcherServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let bus = self.bus.clone();

        task_manager.spawn_task(self.name().to_string(), |cancel_token| async move {
            run_config_watcher(state, bus, cancel_token).await
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ConfigWatcherService"
    }

    fn priority(&self) -> i32 {
        3
    }
}

/// Bridges notify's callback thread into the async world.
struct ChannelHandler {
    sender: mpsc::UnboundedSender<notify::Result<notify::Event>>,
}

impl EventHandler for ChannelHandler {
    fn handle_event(&mut self, event: notify::Result<notify::Event>) {
        if self.sender.send(event).is_err() {
            error!("Config watcher channel closed");
        }
    }
}

async fn run_config_watcher(
    state: Arc<AppState>,
    bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let config_path = state.config_manager().path().to_path_buf();
    info!("Watching config file: {}", config_path.display());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = recommended_watcher(ChannelHandler { sender: tx })?;

    // Editors replace the file rather than write in place, so watch the
    // containing directory.
    let watch_path = config_path
        .parent()
        .map_or_else(|| config_path.clone(), |p| p.to_path_buf());
    watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;

    let mut debounce = tokio::time::interval(DEBOUNCE);
    debounce.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut pending = false;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Config watcher cancelled");
                return Ok(());
            }

            event = rx.recv() => match event {
                Some(Ok(event)) => {
                    let affects_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == config_path.file_name());
                    if affects_config && (event.kind.is_modify() || event.kind.is_create()) {
                        debug!("Config file touched, scheduling analysis");
                        pending = true;
                    }
                }
                Some(Err(e)) => warn!("Filesystem watcher error: {e}"),
                None => {
                    warn!("Filesystem event channel closed");
                    return Ok(());
                }
            },

            _ = debounce.tick(), if pending => {
                pending = false;
                if let Err(e) = analyze_and_apply(state.config_manager(), &bus).await {
                    warn!("Config change analysis failed: {e}");
                }
            }
        }
    }
}

/// Diffs the on-disk config against the active one; applies hot changes
/// and announces cold ones.
async fn analyze_and_apply(config_manager: &ConfigManager, bus: &EventBus) -> Result<()> {
    let new = config_manager.peek().await?;
    let old = config_manager.clone_config().await;

    let changed = changed_sections(&old, &new);
    if changed.is_empty() {
        debug!("Config file rewritten without effective changes");
        return Ok(());
    }

    if changed.iter().all(|s| HOT_SECTIONS.contains(s)) {
        info!("Hot-reloading config sections: {changed:?}");
        config_manager.reload().await?;
        bus.publish(AppEvent::ConfigChangeDetected(ConfigChangeType::HotReload));
    } else {
        info!("Config changes require restart: {changed:?}");
        bus.publish(AppEvent::ConfigChangeDetected(ConfigChangeType::ColdRestart {
            changed_sections: changed.iter().map(ToString::to_string).collect(),
        }));
    }
    Ok(())
}

fn changed_sections(old: &Config, new: &Config) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if old.wifi != new.wifi {
        changed.push("wifi");
    }
    if old.weather != new.weather {
        changed.push("weather");
    }
    if old.fan != new.fan {
        changed.push("fan");
    }
    if old.display != new.display {
        changed.push("display");
    }
    if old.motion != new.motion {
        changed.push("motion");
    }
    if old.battery != new.battery {
        changed.push("battery");
    }
    if old.buttons != new.buttons {
        changed.push("buttons");
    }
    if old.hardware != new.hardware {
        changed.push("hardware");
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn identical_configs_show_no_changes() {
        let config = Config::default();
        assert!(changed_sections(&config, &config.clone()).is_empty());
    }

    #[test]
    fn section_diffs_are_named() {
        let old = Config::default();
        let mut new = old.clone();
        new.fan.hysteresis_pc = 2.5;
        new.wifi.ssid = "other".to_string();

        assert_eq!(changed_sections(&old, &new), vec!["wifi", "fan"]);
    }

    #[tokio::test]
    async fn hot_change_is_applied_in_place() {
        let file = NamedTempFile::new().expect("tempfile");
        fs::write(file.path(), "version: 1\n").expect("write");
        let manager = ConfigManager::load(Some(file.path().to_path_buf()))
            .await
            .expect("load");
        let bus = EventBus::new();
        let mut events = bus.subscribe();

        fs::write(file.path(), "version: 1\nfan:\n  hysteresis_pc: 3.0\n").expect("rewrite");
        analyze_and_apply(&manager, &bus).await.expect("analyze");

        assert_eq!(manager.get().await.fan.hysteresis_pc, 3.0);
        assert!(matches!(
            events.recv().await.expect("event"),
            AppEvent::ConfigChangeDetected(ConfigChangeType::HotReload)
        ));
    }

    #[tokio::test]
    async fn hardware_change_requires_restart() {
        let file = NamedTempFile::new().expect("tempfile");
        fs::write(file.path(), "version: 1\n").expect("write");
        let manager = ConfigManager::load(Some(file.path().to_path_buf()))
            .await
            .expect("load");
        let bus = EventBus::new();
        let mut events = bus.subscribe();

        fs::write(file.path(), "version: 1\nwifi:\n  ssid: elsewhere\n").expect("rewrite");
        analyze_and_apply(&manager, &bus).await.expect("analyze");

        // The active config is untouched until the operator restarts.
        assert_eq!(manager.get().await.wifi.ssid, Config::default().wifi.ssid);
        match events.recv().await.expect("event") {
            AppEvent::ConfigChangeDetected(ConfigChangeType::ColdRestart { changed_sections }) => {
                assert_eq!(changed_sections, vec!["wifi".to_string()]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparsable_rewrite_is_an_error() {
        let file = NamedTempFile::new().expect("tempfile");
        fs::write(file.path(), "version: 1\n").expect("write");
        let manager = ConfigManager::load(Some(file.path().to_path_buf()))
            .await
            .expect("load");
        let bus = EventBus::new();

        fs::write(file.path(), "{{nope").expect("rewrite");
        assert!(analyze_and_apply(&manager, &bus).await.is_err());
    }
}
