//! Event-driven communication system for inter-service messaging.

use tokio::sync::broadcast;

use crate::connectivity::LinkStatus;

/// Type of configuration change detected
#[derive(Debug, Clone)]
pub enum ConfigChangeType {
    /// Configuration changes that can be applied without restart
    HotReload,
    /// Configuration changes that require full daemon restart
    ColdRestart {
        /// List of changed hardware-related sections
        changed_sections: Vec<String>,
    },
}

/// Application events for inter-service communication.
///
/// Events are published through the EventBus and consumed by interested
/// services. This enables loose coupling between components: the managers
/// never call into each other except through narrow accessors.
#[derive(Debug, Clone)]
pub enum Event {
    /// Configuration change detection with type classification
    ConfigChangeDetected(ConfigChangeType),
    SystemShutdown,
    /// A fan assessment completed with the given humidity pair.
    HumidityAssessed {
        indoor: Option<f64>,
        outdoor: Option<f64>,
    },
    /// The fan actuator was set to a new speed in [0.0, 1.0].
    FanSpeedChanged(f64),
    /// The radio link entered a new state.
    ConnectivityChanged(LinkStatus),
    /// Motion became detected (true) or no longer detected (false).
    MotionChanged(bool),
    /// A fresh battery voltage sample is available.
    BatteryUpdated(f64),
    /// A debounced button press was confirmed.
    ButtonPressed(String),
}

/// Event bus for publish-subscribe messaging between services.
///
/// Provides a centralized communication mechanism that allows services
/// to communicate without direct dependencies.
///
/// # Example
///
/// ```no_run
/// use ventd::event::{Event, EventBus};
///
/// // Create event bus and subscriber
/// let event_bus = EventBus::new();
/// let mut subscriber = event_bus.subscribe();
///
/// // Publish an event
/// event_bus.publish(Event::FanSpeedChanged(0.9));
///
/// // In async context, receive events:
/// // let event = subscriber.recv().await;
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a new EventBus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Creates a new EventBus with custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Delivery is best-effort: with no live subscribers the event is
    /// dropped, which is fine for status-style notifications.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// Creates a new subscription to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
