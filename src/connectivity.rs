//! Wireless link management.
//!
//! Wraps the raw radio driver in a small state machine: idempotent access
//! checks, bounded connect retries with backoff, and link status fan-out to
//! the display, the status LED and the event bus.

use std::{fmt, sync::Arc, time::Duration};

use anyhow::Result;
use log::{debug, info, warn};
use tokio::{sync::RwLock, time::Instant};

use crate::{
    config::WifiCfg,
    display::{self, DisplayManager},
    event::{Event, EventBus},
    hw::{Radio, StatusLed},
};

/// Link status polling interval while a join is in flight.
const STATUS_POLL: Duration = Duration::from_millis(500);
/// Joins slower than this are worth a log line.
const SLOW_CONNECT_WARNING: Duration = Duration::from_secs(5);

/// Radio link state, mapped from the driver status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Down,
    Joining,
    NoIp,
    Up,
    Failed,
    NoNetwork,
    BadAuth,
}

impl LinkStatus {
    /// Maps a raw driver status code; unknown codes count as failed.
    pub fn from_code(code: i8) -> Self {
        match code {
            0 => Self::Down,
            1 => Self::Joining,
            2 => Self::NoIp,
            3 => Self::Up,
            -1 => Self::Failed,
            -2 => Self::NoNetwork,
            -3 => Self::BadAuth,
            other => {
                warn!("Unknown link status code {other}");
                Self::Failed
            }
        }
    }

    pub fn is_up(self) -> bool {
        self == Self::Up
    }

    /// Whether the driver reported a join failure (the negative codes).
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::NoNetwork | Self::BadAuth)
    }

    /// Short text for the status display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Down => "Down",
            Self::Joining => "Joining",
            Self::NoIp => "No IP",
            Self::Up => "Up",
            Self::Failed => "Failed",
            Self::NoNetwork => "No AP",
            Self::BadAuth => "Bad auth",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub struct ConnectivityManager {
    radio: Arc<dyn Radio>,
    display: Arc<DisplayManager>,
    led: StatusLed,
    bus: EventBus,
    status: RwLock<LinkStatus>,
}

impl ConnectivityManager {
    pub fn new(
        radio: Arc<dyn Radio>,
        display: Arc<DisplayManager>,
        led: StatusLed,
        bus: EventBus,
    ) -> Self {
        Self {
            radio,
            display,
            led,
            bus,
            status: RwLock::new(LinkStatus::Down),
        }
    }

    /// Last known link status.
    pub async fn status(&self) -> LinkStatus {
        *self.status.read().await
    }

    pub async fn is_up(&self) -> bool {
        self.status().await.is_up()
    }

    /// Radio MAC address, readable without a link.
    pub fn mac(&self) -> String {
        self.radio.mac()
    }

    /// Ensures the link is up, joining if necessary.
    ///
    /// Idempotent: an already established link returns immediately without
    /// touching the radio beyond a status read.
    pub async fn check_network_access(&self, wifi: &WifiCfg) -> Result<bool> {
        let current = LinkStatus::from_code(self.radio.status().await?);
        if current.is_up() {
            debug!("Network already up");
            self.set_status(LinkStatus::Up).await?;
            return Ok(true);
        }

        self.connect_with_retries(wifi).await
    }

    /// Joins the configured network with bounded retries.
    ///
    /// `max_retries` of N allows N+1 join attempts; a negative value
    /// retries until the link comes up.
    async fn connect_with_retries(&self, wifi: &WifiCfg) -> Result<bool> {
        let backoff = Duration::from_secs(u64::from(wifi.retry_backoff_secs));
        let mut retries: i32 = 0;

        loop {
            let outcome = self.attempt_connect(wifi).await?;
            self.set_status(outcome).await?;

            if outcome.is_up() {
                self.led.flash(2, 4.0);
                self.log_ifconfig().await;
                return Ok(true);
            }

            warn!("Connection attempt failed: {outcome}");
            if wifi.max_retries >= 0 && retries >= wifi.max_retries {
                warn!(
                    "Giving up on '{}' after {} attempts",
                    wifi.ssid,
                    retries + 1
                );
                return Ok(false);
            }
            retries += 1;

            self.led.flash(4, 1.0);
            debug!("Retrying in {}s", backoff.as_secs());
            tokio::time::sleep(backoff).await;
        }
    }

    /// One join attempt: reset a half-open link, connect, poll until the
    /// link is up, fails, or the configured timeout passes.
    async fn attempt_connect(&self, wifi: &WifiCfg) -> Result<LinkStatus> {
        self.disconnect_if_necessary().await?;

        info!("Connecting to '{}'", wifi.ssid);
        self.set_status(LinkStatus::Joining).await?;
        let started = Instant::now();
        if let Err(e) = self.radio.connect(&wifi.ssid, &wifi.password).await {
            warn!("Radio connect failed: {e}");
            return Ok(LinkStatus::Failed);
        }

        let deadline = started + Duration::from_secs(u64::from(wifi.connect_timeout_secs));
        loop {
            let status = LinkStatus::from_code(self.radio.status().await?);
            if status.is_up() {
                let took = started.elapsed();
                if took > SLOW_CONNECT_WARNING {
                    warn!("Connection took {:.1}s", took.as_secs_f64());
                }
                return Ok(LinkStatus::Up);
            }
            if status.is_failure() {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!("Connection timed out in state {status}");
                return Ok(status);
            }
            tokio::time::sleep(STATUS_POLL).await;
        }
    }

    /// A link part-way through joining must be torn down before a fresh
    /// attempt or the driver wedges.
    async fn disconnect_if_necessary(&self) -> Result<()> {
        let code = self.radio.status().await?;
        if (1..=3).contains(&code) {
            debug!("Resetting link from status {code}");
            self.radio.disconnect().await?;
        }
        Ok(())
    }

    /// Tears the link down, for shutdown.
    pub async fn disconnect(&self) -> Result<()> {
        self.radio.disconnect().await?;
        self.set_status(LinkStatus::Down).await
    }

    async fn set_status(&self, status: LinkStatus) -> Result<()> {
        let changed = {
            let mut current = self.status.write().await;
            let changed = *current != status;
            *current = status;
            changed
        };

        if changed {
            info!("Link status: {status}");
            self.bus.publish(Event::ConnectivityChanged(status));
            self.display
                .update_status(&[(display::KEY_WIFI_STATUS, status.label().to_string())])
                .await?;
        }
        Ok(())
    }

    async fn log_ifconfig(&self) {
        match self.radio.ifconfig().await {
            Ok(cfg) => info!(
                "ip {} subnet {} gateway {} dns {}",
                cfg.ip, cfg.subnet, cfg.gateway, cfg.dns
            ),
            Err(e) => warn!("ifconfig unavailable: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplayCfg;
    use crate::hw::{IfConfig, MockRadio, StatusLedDriver};
    use mockall::Sequence;
    use pretty_assertions::assert_eq;

    fn wifi_cfg(max_retries: i32) -> WifiCfg {
        WifiCfg {
            ssid: "home".to_string(),
            password: "secret".to_string(),
            country: "GB".to_string(),
            connect_timeout_secs: 10,
            max_retries,
            retry_backoff_secs: 5,
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

    #[test]
    fn status_codes_map_to_link_states() {
        assert_eq!(LinkStatus::from_code(0), LinkStatus::Down);
        assert_eq!(LinkStatus::from_code(1), LinkStatus::Joining);
        assert_eq!(LinkStatus::from_code(2), LinkStatus::NoIp);
        assert_eq!(LinkStatus::from_code(3), LinkStatus::Up);
        assert_eq!(LinkStatus::from_code(-1), LinkStatus::Failed);
        assert_eq!(LinkStatus::from_code(-2), LinkStatus::NoNetwork);
        assert_eq!(LinkStatus::from_code(-3), LinkStatus::BadAuth);
        assert_eq!(LinkStatus::from_code(42), LinkStatus::Failed);
    }

    #[tokio::test]
    async fn established_link_short_circuits() {
        let mut radio = MockRadio::new();
        radio.expect_status().returning(|| Ok(3));
        radio.expect_connect().never();

        let (led, _driver) = StatusLedDriver::new(Arc::new(crate::hw::MockDigitalOutput::new()));
        let manager = ConnectivityManager::new(
            Arc::new(radio),
            disabled_display(),
            led,
            EventBus::new(),
        );

        let connected = manager
            .check_network_access(&wifi_cfg(1))
            .await
            .expect("check");
        assert!(connected);
        assert_eq!(manager.status().await, LinkStatus::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_bound_allows_exactly_one_extra_attempt() {
        let mut radio = MockRadio::new();
        // No access point in sight: every status read reports no-network.
        radio.expect_status().returning(|| Ok(-2));
        radio.expect_connect().times(2).returning(|_, _| Ok(()));
        radio.expect_disconnect().never();

        let (led, _driver) = StatusLedDriver::new(Arc::new(crate::hw::MockDigitalOutput::new()));
        let manager = ConnectivityManager::new(
            Arc::new(radio),
            disabled_display(),
            led,
            EventBus::new(),
        );

        let connected = manager
            .check_network_access(&wifi_cfg(1))
            .await
            .expect("check");
        assert!(!connected);
        assert_eq!(manager.status().await, LinkStatus::NoNetwork);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_join_reports_up_and_publishes() {
        let mut radio = MockRadio::new();
        let mut seq = Sequence::new();
        // Down before the attempt, up once the join completes.
        radio
            .expect_status()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Ok(0));
        radio
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        radio
            .expect_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(3));
        radio.expect_ifconfig().returning(|| {
            Ok(IfConfig {
                ip: "10.0.0.2".into(),
                subnet: "255.255.255.0".into(),
                gateway: "10.0.0.1".into(),
                dns: "10.0.0.1".into(),
            })
        });

        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let (led, _driver) = StatusLedDriver::new(Arc::new(crate::hw::MockDigitalOutput::new()));
        let manager =
            ConnectivityManager::new(Arc::new(radio), disabled_display(), led, bus.clone());

        let connected = manager
            .check_network_access(&wifi_cfg(0))
            .await
            .expect("check");
        assert!(connected);
        assert!(manager.is_up().await);

        assert!(matches!(
            events.recv().await.expect("event"),
            Event::ConnectivityChanged(LinkStatus::Joining)
        ));
        assert!(matches!(
            events.recv().await.expect("event"),
            Event::ConnectivityChanged(LinkStatus::Up)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_link_is_reset_before_joining() {
        let mut radio = MockRadio::new();
        let mut seq = Sequence::new();
        // Stuck in joining: the stale attempt must be torn down first.
        radio
            .expect_status()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Ok(1));
        radio
            .expect_disconnect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        radio
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        radio
            .expect_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(3));
        radio.expect_ifconfig().returning(|| {
            Ok(IfConfig {
                ip: "10.0.0.2".into(),
                subnet: "255.255.255.0".into(),
                gateway: "10.0.0.1".into(),
                dns: "10.0.0.1".into(),
            })
        });

        let (led, _driver) = StatusLedDriver::new(Arc::new(crate::hw::MockDigitalOutput::new()));
        let manager = ConnectivityManager::new(
            Arc::new(radio),
            disabled_display(),
            led,
            EventBus::new(),
        );

        assert!(
            manager
                .check_network_access(&wifi_cfg(0))
                .await
                .expect("check")
        );
    }
}
