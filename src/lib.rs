//! # ventd
//!
//! A daemon that keeps an enclosed space dry by balancing indoor humidity
//! against the weather outside and driving a ventilation fan accordingly.
//!
//! ## Features
//!
//! - **Async Architecture**: cooperative single-threaded multitasking on Tokio
//! - **Event-Driven**: modular services communicate via EventBus
//! - **Humidity Control**: indoor sensor vs Open-Meteo outdoor reading with
//!   hysteresis and a fail-safe bias toward full ventilation
//! - **Connectivity Management**: radio link state machine with bounded
//!   retry/backoff
//! - **Status Display**: auto-paginated startup log and a live status page
//!   with backlight timeout
//! - **Motion Lighting**: debounced PIR input driving a dimmable light with a
//!   delayed-off timer
//! - **D-Bus Interface**: read-only status surface and external control
//! - **Hot Reload**: tunable configuration changes without restart
//!
//! ## Architecture
//!
//! The daemon uses a provider-based dependency injection system with:
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - Main lifecycle manager
//! - [`EventBus`](event::EventBus) - Inter-service communication
//! - [`AppState`](app_context::AppState) - Shared application state
//! - Service providers for modular functionality
//!
//! ## Example
//!
//! ```no_run
//! use ventd::{application::Application, config::ConfigManager};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod battery;
pub mod button;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod display;
pub mod drivers;
pub mod event;
pub mod fan;
pub mod hw;
pub mod interface;
pub mod light;
pub mod motion;
pub mod providers;
pub mod speed;
pub mod task_manager;
pub mod weather;
