//! System coordinator: service lifecycle and the main event loop.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{error, info, warn};

use crate::{
    app_context::AppState,
    config::ConfigManager,
    event::{ConfigChangeType, Event, EventBus},
    providers::{
        AppStateProvider, AsyncProvider, BatteryServiceProvider, ButtonServiceProvider,
        ConfigWatcherServiceProvider, DBusServiceProvider, DisplayServiceProvider,
        FanServiceProvider, LedServiceProvider, MotionServiceProvider, ServiceProvider,
    },
    task_manager::TaskManager,
};

/// Whether the main loop keeps running after an event.
enum LoopAction {
    Continue,
    Stop,
}

/// Orchestrates startup, the service set, and shutdown.
///
/// Services are registered through providers, sorted by priority, and
/// started with graceful degradation: only a critical service failure
/// aborts startup.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    shared_state: Option<Arc<AppState>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            event_bus: EventBus::new(),
            shared_state: None,
            service_providers: Vec::new(),
        }
    }

    /// Builds the application state, paints the startup display, and
    /// registers the service providers.
    pub async fn initialize(&mut self, config_manager: ConfigManager) -> Result<()> {
        info!("Initializing system coordinator");

        let state = AppStateProvider::new(config_manager, self.event_bus.clone())
            .provide()
            .await
            .context("Failed to initialize application state")?;
        self.shared_state = Some(state.clone());

        self.show_startup_summary(&state)
            .await
            .context("Startup display failed")?;

        self.register_service_providers(state).await;
        info!("Coordinator initialization completed");
        Ok(())
    }

    async fn show_startup_summary(&self, state: &Arc<AppState>) -> Result<()> {
        let config = state.config().await;

        state.display.init().await?;
        state
            .display
            .add_startup_line(&format!("ventd v{}", env!("CARGO_PKG_VERSION")))
            .await?;
        state
            .display
            .add_startup_line(&format!("mac: {}", state.connectivity.mac()))
            .await?;
        state
            .display
            .add_startup_line(&format!("wifi: {}", config.wifi.ssid))
            .await?;

        // A dead network is survivable; the fan loop falls back to full
        // speed until it recovers.
        let network_line = match state.connectivity.check_network_access(&config.wifi).await {
            Ok(true) => "network: up".to_string(),
            Ok(false) => {
                warn!("Starting without network access");
                "network: down".to_string()
            }
            Err(e) => {
                warn!("Network check failed at startup: {e}");
                "network: error".to_string()
            }
        };
        state.display.add_startup_line(&network_line).await?;

        Ok(())
    }

    /// Registers the full provider set, sorted by descending priority.
    async fn register_service_providers(&mut self, state: Arc<AppState>) {
        let light = state.light.clone();
        let motion = state.motion.clone();
        let buttons = ButtonServiceProvider::new(state.clone())
            .on_press("A", move || {
                let light = light.clone();
                async move {
                    if light.is_on().await {
                        light.off().await
                    } else {
                        light.on().await
                    }
                }
            })
            .on_press("B", move || {
                let motion = motion.clone();
                async move {
                    if motion.is_enabled().await {
                        motion.disable().await;
                    } else {
                        motion.enable().await;
                    }
                    Ok(())
                }
            });

        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![
            Box::new(FanServiceProvider::new(state.clone())),
            Box::new(LedServiceProvider::new(state.clone())),
            Box::new(DisplayServiceProvider::new(state.clone())),
            Box::new(MotionServiceProvider::new(state.clone())),
            Box::new(buttons),
            Box::new(BatteryServiceProvider::new(state.clone())),
            Box::new(ConfigWatcherServiceProvider::new(
                state.clone(),
                self.event_bus.clone(),
            )),
        ];

        // No session bus means no remote control, not a broken daemon.
        match DBusServiceProvider::new(state, self.event_bus.clone()).await {
            Ok(provider) => providers.push(Box::new(provider)),
            Err(e) => warn!("D-Bus unavailable, running without remote control: {e}"),
        }

        providers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        info!("Registered {} service providers", providers.len());
        self.service_providers = providers;
    }

    /// Starts every registered service in priority order.
    ///
    /// A critical service failure aborts startup; non-critical failures
    /// degrade the daemon and are logged.
    pub async fn start_all_services(&mut self) -> Result<()> {
        info!(
            "Starting {} services in priority order",
            self.service_providers.len()
        );

        for provider in &self.service_providers {
            match provider.start(&mut self.task_manager).await {
                Ok(()) => info!(
                    "Service '{}' started (priority {}, critical: {})",
                    provider.name(),
                    provider.priority(),
                    provider.is_critical()
                ),
                Err(e) if provider.is_critical() => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => warn!(
                    "Non-critical service '{}' failed to start: {e}",
                    provider.name()
                ),
            }
        }

        if let Some(state) = &self.shared_state {
            state.display.add_startup_line("services up").await?;
            state.display.set_main_mode().await?;
        }

        info!("All critical services started");
        Ok(())
    }

    /// Runs until Ctrl+C or a shutdown request arrives on the bus.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut events = self.event_bus.subscribe();
        info!("Entering main loop");

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for shutdown signal")?;
                    info!("Received Ctrl+C, shutting down");
                    self.shutdown().await;
                    break;
                }

                event = events.recv() => {
                    if let LoopAction::Stop = self.handle_event(event).await? {
                        break;
                    }
                }
            }
        }

        info!("Main loop terminated");
        Ok(())
    }

    async fn handle_event(
        &mut self,
        event: Result<Event, tokio::sync::broadcast::error::RecvError>,
    ) -> Result<LoopAction> {
        match event {
            Ok(Event::SystemShutdown) => {
                info!("Shutdown requested");
                self.shutdown().await;
                return Ok(LoopAction::Stop);
            }
            Ok(Event::ConfigChangeDetected(change_type)) => {
                self.handle_config_change(change_type);
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                bail!("Event bus closed unexpectedly");
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!("Main loop lagged by {n} events");
            }
        }
        Ok(LoopAction::Continue)
    }

    fn handle_config_change(&self, change_type: ConfigChangeType) {
        match change_type {
            // The watcher already swapped the config in place; services
            // pick the new values up on their next cycle.
            ConfigChangeType::HotReload => info!("Configuration hot-reloaded"),
            ConfigChangeType::ColdRestart { changed_sections } => {
                warn!("Config sections {changed_sections:?} changed on disk");
                warn!("Restart ventd to apply them, e.g. `systemctl restart ventd`");
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("Initiating graceful shutdown");
        if let Err(e) = self.task_manager.shutdown_all().await {
            error!("Error during task shutdown: {e}");
        }
        if let Some(state) = &self.shared_state
            && let Err(e) = state.connectivity.disconnect().await
        {
            warn!("Failed to drop the network link: {e}");
        }
        info!("Shutdown complete");
    }

    /// Event bus handle, mainly for tests and the application wrapper.
    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    #[cfg(test)]
    fn registered_services(&self) -> Vec<&'static str> {
        self.service_providers.iter().map(|p| p.name()).collect()
    }
}
