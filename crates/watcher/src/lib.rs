//! Per-path file watching on top of the kernel's event queue
//!
//! This crate watches an explicit set of paths with:
//! - One kernel watch per path (kqueue vnode filters, inotify on Linux)
//! - A background monitor thread started with the first path and stopped
//!   with the last
//! - Delivery to an optional synchronous callback and an async [`EventStream`]
//! - Pause/resume that discards events instead of buffering them
//!
//! ```no_run
//! use kwatch::{FileQueue, Notification};
//!
//! let queue = FileQueue::builder()
//!     .callback(|event| println!("{event}"))
//!     .build()
//!     .expect("kernel queue");
//! queue.watch_with("/tmp/app.log", Notification::WRITE | Notification::DELETE)?;
//! # Ok::<(), kwatch::WatchError>(())
//! ```

pub mod monitor;
mod platform;
pub mod queue;
mod registry;
mod sink;
pub mod stream;

pub use kwatch_core::{target, Event, Notification, ParseNotificationError, QueueConfig, WatchError};
pub use monitor::MonitorStatus;
pub use platform::Descriptor;
pub use queue::{FileQueue, QueueBuilder};
pub use sink::Callback;
pub use stream::EventStream;
