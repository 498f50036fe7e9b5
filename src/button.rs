//! Debounced push buttons.
//!
//! Raw GPIO levels bounce for a few milliseconds around each press, so a
//! level change only becomes a confirmed transition after a fixed run of
//! consecutive samples that disagree with the confirmed state. Buttons are
//! wired active-low.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use event_listener::{Event as Notify, EventListener};
use log::{debug, info};
use std::time::Duration;

use crate::{
    event::{Event, EventBus},
    hw::DigitalInput,
};

/// Consecutive disagreeing samples required to confirm a transition.
const DEBOUNCE_SAMPLES: u32 = 20;
/// Sampling interval.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

pub struct Button {
    name: String,
    pin: Arc<dyn DigitalInput>,
    bus: EventBus,
    pressed: Notify,
    released: Notify,
    is_pressed: AtomicBool,
}

impl Button {
    pub fn new(name: String, pin: Arc<dyn DigitalInput>, bus: EventBus) -> Self {
        Self {
            name,
            pin,
            bus,
            pressed: Notify::new(),
            released: Notify::new(),
            is_pressed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Confirmed (debounced) pressed state.
    pub fn is_pressed(&self) -> bool {
        self.is_pressed.load(Ordering::SeqCst)
    }

    /// Listener resolved on the next confirmed press.
    pub fn listen_pressed(&self) -> EventListener {
        self.pressed.listen()
    }

    /// Listener resolved on the next confirmed release.
    pub fn listen_released(&self) -> EventListener {
        self.released.listen()
    }

    /// Samples the pin and confirms transitions.
    ///
    /// A transition is confirmed only after [`DEBOUNCE_SAMPLES`] samples in
    /// a row disagree with the confirmed level; any agreeing sample resets
    /// the streak, so contact bounce never gets through.
    pub async fn run_debounce(&self) -> Result<()> {
        info!("Watching button '{}'", self.name);

        let mut confirmed = self.pin.level().await?;
        self.is_pressed.store(!confirmed, Ordering::SeqCst);
        let mut streak = 0;

        loop {
            tokio::time::sleep(SAMPLE_INTERVAL).await;
            let level = self.pin.level().await?;
            if level == confirmed {
                streak = 0;
                continue;
            }

            streak += 1;
            if streak < DEBOUNCE_SAMPLES {
                continue;
            }

            confirmed = level;
            streak = 0;
            // Active low: a confirmed low level is a press.
            let pressed = !confirmed;
            self.is_pressed.store(pressed, Ordering::SeqCst);
            if pressed {
                debug!("Button '{}' pressed", self.name);
                self.pressed.notify(usize::MAX);
                self.bus.publish(Event::ButtonPressed(self.name.clone()));
            } else {
                debug!("Button '{}' released", self.name);
                self.released.notify(usize::MAX);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakePin {
        level: AtomicBool,
    }

    impl FakePin {
        fn new() -> Arc<Self> {
            // Idle high, active low.
            Arc::new(Self {
                level: AtomicBool::new(true),
            })
        }

        fn set(&self, level: bool) {
            self.level.store(level, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DigitalInput for FakePin {
        async fn level(&self) -> Result<bool> {
            Ok(self.level.load(Ordering::SeqCst))
        }
    }

    fn button(pin: Arc<FakePin>, bus: EventBus) -> Arc<Button> {
        Arc::new(Button::new("a".to_string(), pin, bus))
    }

    #[tokio::test(start_paused = true)]
    async fn steady_press_is_confirmed_and_published() {
        let pin = FakePin::new();
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let button = button(pin.clone(), bus);

        let sampler = button.clone();
        tokio::spawn(async move { sampler.run_debounce().await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        pin.set(false);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(button.is_pressed());
        assert!(matches!(
            events.recv().await.expect("event"),
            Event::ButtonPressed(name) if name == "a"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn short_glitch_is_rejected() {
        let pin = FakePin::new();
        let bus = EventBus::new();
        let button = button(pin.clone(), bus);

        let sampler = button.clone();
        tokio::spawn(async move { sampler.run_debounce().await });

        // Ten milliseconds of bounce, half the debounce window.
        tokio::time::sleep(Duration::from_millis(5)).await;
        pin.set(false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        pin.set(true);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!button.is_pressed());
    }

    #[tokio::test(start_paused = true)]
    async fn release_notifies_released_listeners_only() {
        let pin = FakePin::new();
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let button = button(pin.clone(), bus.clone());

        let sampler = button.clone();
        tokio::spawn(async move { sampler.run_debounce().await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        pin.set(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let released = button.listen_released();
        pin.set(true);
        tokio::time::sleep(Duration::from_millis(50)).await;

        released.await;
        assert!(!button.is_pressed());

        // Exactly one press event: the release publishes nothing.
        assert!(matches!(
            events.try_recv(),
            Ok(Event::ButtonPressed(name)) if name == "a"
        ));
        assert!(events.try_recv().is_err());
    }
}
