//! Core types for kwatch
//!
//! This crate provides:
//! - The `Notification` set (kqueue vnode kinds, presets, capability checks)
//! - The `Event` delivered to callers
//! - The `WatchError` taxonomy
//! - `file:` URL to path conversion
//! - Queue configuration (TOML)

pub mod config;
pub mod error;
pub mod event;
pub mod notification;
pub mod target;

// Re-exports
pub use config::QueueConfig;
pub use error::WatchError;
pub use event::Event;
pub use notification::{Notification, ParseNotificationError};
