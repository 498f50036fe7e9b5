//! Button service provider: debounce plus press dispatch.

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use log::{debug, error, info};
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState, button::Button, display::DisplayManager,
    providers::traits::ServiceProvider, task_manager::TaskManager,
};

/// Async callback run on a confirmed press.
pub type ButtonHandler = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Runs two tasks per configured button: the debounce sampler and a
/// dispatcher for confirmed presses.
///
/// A press with the backlight off only wakes the display; the registered
/// handler fires only when the user could already see the screen. Buttons
/// without a handler still wake the display and publish their press.
pub struct ButtonServiceProvider {
    state: Arc<AppState>,
    handlers: HashMap<String, ButtonHandler>,
}

impl ButtonServiceProvider {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for presses of the named button.
    pub fn on_press<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.handlers
            .insert(name.to_string(), Arc::new(move || Box::pin(handler())));
        self
    }
}

#[async_trait]
impl ServiceProvider for ButtonServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        for button in &self.state.buttons {
            let name = button.name().to_string();

            let sampler = button.clone();
            task_manager.spawn_task(format!("Button{name}Debounce"), |cancel_token| async move {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        info!("Button debounce cancelled");
                        Ok(())
                    }
                    result = sampler.run_debounce() => result,
                }
            });

            let dispatch_button = button.clone();
            let display = self.state.display.clone();
            let handler = self.handlers.get(&name).cloned();
            task_manager.spawn_task(format!("Button{name}Dispatch"), |cancel_token| async move {
                run_dispatch(dispatch_button, display, handler, cancel_token).await
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ButtonService"
    }

    fn priority(&self) -> i32 {
        6
    }
}

async fn run_dispatch(
    button: Arc<Button>,
    display: Arc<DisplayManager>,
    handler: Option<ButtonHandler>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut pressed = button.listen_pressed();
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Button dispatch cancelled");
                return Ok(());
            }
            () = pressed => {
                // Re-arm before acting: a press confirmed while the handler
                // runs latches and dispatches on the next iteration.
                pressed = button.listen_pressed();
                let was_visible = display.backlight_is_on().await;
                display.backlight_on().await?;
                if !was_visible {
                    debug!("Button '{}' woke the display", button.name());
                    continue;
                }
                if let Some(handler) = &handler
                    && let Err(e) = handler().await
                {
                    error!("Button '{}' handler failed: {e}", button.name());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplayCfg;
    use crate::event::EventBus;
    use crate::hw::DigitalInput;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    struct FakePin {
        level: AtomicBool,
    }

    #[async_trait]
    impl DigitalInput for FakePin {
        async fn level(&self) -> Result<bool> {
            Ok(self.level.load(Ordering::SeqCst))
        }
    }

    fn display(enabled: bool) -> Arc<DisplayManager> {
        let mut panel = crate::hw::MockDisplayPanel::new();
        panel.expect_bounds().return_const((240u32, 135u32));
        panel.expect_set_backlight().returning(|_| Ok(()));
        panel.expect_clear().returning(|| Ok(()));
        panel.expect_draw_text().returning(|_, _, _, _, _| Ok(()));
        panel.expect_flush().returning(|| Ok(()));
        Arc::new(DisplayManager::new(
            Arc::new(panel),
            &DisplayCfg {
                enabled,
                page_scroll_pause_secs: 0,
                backlight_timeout_secs: 30,
            },
        ))
    }

    async fn press(pin: &FakePin) {
        pin.level.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        pin.level.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_press_only_wakes_a_dark_display() {
        let pin = Arc::new(FakePin {
            level: AtomicBool::new(true),
        });
        let button = Arc::new(Button::new("A".to_string(), pin.clone(), EventBus::new()));
        let display = display(true);

        let calls = Arc::new(AtomicU32::new(0));
        let handler_calls = calls.clone();
        let handler: ButtonHandler = Arc::new(move || {
            let calls = handler_calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let sampler = button.clone();
        tokio::spawn(async move { sampler.run_debounce().await });
        let cancel = CancellationToken::new();
        let dispatch = {
            let button = button.clone();
            let display = display.clone();
            let cancel = cancel.clone();
            tokio::spawn(
                async move { run_dispatch(button, display, Some(handler), cancel).await },
            )
        };

        tokio::time::sleep(Duration::from_millis(5)).await;

        // Dark display: the first press wakes it without firing the handler.
        press(&pin).await;
        assert!(display.backlight_is_on().await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Lit display: the next press reaches the handler.
        press(&pin).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cancel.cancel();
        dispatch.await.expect("join").expect("dispatch");
    }

    #[tokio::test(start_paused = true)]
    async fn headless_device_always_runs_the_handler() {
        let pin = Arc::new(FakePin {
            level: AtomicBool::new(true),
        });
        let button = Arc::new(Button::new("A".to_string(), pin.clone(), EventBus::new()));
        let display = display(false);

        let calls = Arc::new(AtomicU32::new(0));
        let handler_calls = calls.clone();
        let handler: ButtonHandler = Arc::new(move || {
            let calls = handler_calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let sampler = button.clone();
        tokio::spawn(async move { sampler.run_debounce().await });
        let cancel = CancellationToken::new();
        tokio::spawn({
            let button = button.clone();
            let cancel = cancel.clone();
            async move { run_dispatch(button, display, Some(handler), cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        press(&pin).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn press_during_a_slow_handler_is_not_lost() {
        let pin = Arc::new(FakePin {
            level: AtomicBool::new(true),
        });
        let button = Arc::new(Button::new("A".to_string(), pin.clone(), EventBus::new()));
        let display = display(false);

        let calls = Arc::new(AtomicU32::new(0));
        let handler_calls = calls.clone();
        // The handler stalls long enough for a second press to land mid-run.
        let handler: ButtonHandler = Arc::new(move || {
            let calls = handler_calls.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let sampler = button.clone();
        tokio::spawn(async move { sampler.run_debounce().await });
        let cancel = CancellationToken::new();
        tokio::spawn({
            let button = button.clone();
            let cancel = cancel.clone();
            async move { run_dispatch(button, display, Some(handler), cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        press(&pin).await;
        // Second press while the first handler is still sleeping.
        press(&pin).await;
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        cancel.cancel();
    }
}
