//! D-Bus service provider.

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use zbus::Connection;

use crate::{
    app_context::AppState,
    event::{Event, EventBus},
    interface::StatusInterface,
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

const OBJECT_PATH: &str = "/io/github/ventd";
const BUS_NAME: &str = "io.github.ventd";

/// Serves the control interface on the session bus and forwards internal
/// events as `status_changed` signals.
///
/// Creation fails when no session bus is reachable; the orchestrator
/// treats that as running without remote control rather than a fatal
/// error, so headless deployments work unchanged.
pub struct DBusServiceProvider {
    state: Arc<AppState>,
    bus: EventBus,
    connection: Connection,
}

impl DBusServiceProvider {
    pub async fn new(state: Arc<AppState>, bus: EventBus) -> Result<Self> {
        let connection = Connection::session().await?;
        Ok(Self {
            state,
            bus,
            connection,
        })
    }
}

#[async_trait]
impl ServiceProvider for DBusServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let bus = self.bus.clone();
        let connection = self.connection.clone();

        task_manager.spawn_task(self.name().to_string(), |cancel_token| async move {
            run_dbus_service(state, bus, connection, cancel_token).await
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DBusService"
    }

    fn priority(&self) -> i32 {
        8
    }
}

async fn run_dbus_service(
    state: Arc<AppState>,
    bus: EventBus,
    connection: Connection,
    cancel_token: CancellationToken,
) -> Result<()> {
    let interface = StatusInterface::new(
        state,
        bus.clone(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    connection
        .object_server()
        .at(OBJECT_PATH, interface)
        .await?;
    connection.request_name(BUS_NAME).await?;
    info!("D-Bus interface up at {BUS_NAME}{OBJECT_PATH}");

    let iface_ref = connection
        .object_server()
        .interface::<_, StatusInterface>(OBJECT_PATH)
        .await?;
    let mut events = bus.subscribe();

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("D-Bus service cancelled");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some((field, value)) = signal_for(&event)
                        && let Err(e) = StatusInterface::status_changed(
                            iface_ref.signal_emitter(),
                            field,
                            &value,
                        )
                        .await
                    {
                        warn!("Failed to emit status_changed: {e}");
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("D-Bus signal forwarder lagged, dropped {missed} events");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

/// Maps an internal event to a `status_changed` field/value pair.
fn signal_for(event: &Event) -> Option<(&'static str, String)> {
    match event {
        Event::FanSpeedChanged(speed) => Some(("fan_speed", format!("{speed:.2}"))),
        Event::ConnectivityChanged(status) => Some(("connectivity", status.label().to_string())),
        Event::MotionChanged(detected) => Some(("motion", detected.to_string())),
        Event::BatteryUpdated(volts) => Some(("battery_voltage", format!("{volts:.2}"))),
        Event::ButtonPressed(name) => Some(("button", name.clone())),
        Event::HumidityAssessed { indoor, outdoor } => Some((
            "humidity",
            format!(
                "{}/{}",
                indoor.map_or("?".to_string(), |v| format!("{v:.1}")),
                outdoor.map_or("?".to_string(), |v| format!("{v:.1}")),
            ),
        )),
        Event::ConfigChangeDetected(_) | Event::SystemShutdown => None,
    }
}
