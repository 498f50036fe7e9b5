//! Dependency injection providers for service management.
//!
//! Each provider owns the wiring for one service: it knows how to build
//! the service's dependencies from [`crate::app_context::AppState`] and how
//! to spawn its tasks through the task manager.

pub mod app_state;
pub mod battery_service;
pub mod button_service;
pub mod config_watcher;
pub mod dbus;
pub mod display_service;
pub mod fan_service;
pub mod led;
pub mod motion_service;
pub mod traits;

pub use app_state::AppStateProvider;
pub use battery_service::BatteryServiceProvider;
pub use button_service::ButtonServiceProvider;
pub use config_watcher::ConfigWatcherServiceProvider;
pub use dbus::DBusServiceProvider;
pub use display_service::DisplayServiceProvider;
pub use fan_service::FanServiceProvider;
pub use led::LedServiceProvider;
pub use motion_service::MotionServiceProvider;
pub use traits::{AsyncProvider, ServiceProvider};
