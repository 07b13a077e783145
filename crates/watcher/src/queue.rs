//! The file queue: public watch/unwatch/pause surface

use crate::monitor::{MonitorHandle, MonitorStatus};
use crate::platform::{Descriptor, KernelQueue};
use crate::registry::Registry;
use crate::sink::{Callback, Sink};
use crate::stream::EventStream;
use kwatch_core::config::DEFAULT_POLL_INTERVAL;
use kwatch_core::{target, Event, Notification, QueueConfig, WatchError};
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace};
use url::Url;

/// Shortest pause the monitor loop takes between drain passes
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// State shared between a queue and its monitor loop
pub(crate) struct Shared {
    pub kernel: KernelQueue,
    pub registry: Mutex<Registry>,
    pub sink: Sink,
    pub poll_interval: Duration,
}

/// Builder for [`FileQueue`]
pub struct QueueBuilder {
    poll_interval: Duration,
    notifications: Notification,
    paused: bool,
    callback: Option<Callback>,
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            notifications: Notification::DEFAULT,
            paused: false,
            callback: None,
        }
    }
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a validated [`QueueConfig`]
    pub fn from_config(config: &QueueConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self::new()
            .poll_interval(config.poll_interval())
            .notifications(config.notification_set()?)
            .paused(config.start_paused))
    }

    /// Pause between drain passes (default: 10ms, at least 1ms)
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Kinds armed by [`FileQueue::watch`] (default: [`Notification::DEFAULT`])
    pub fn notifications(mut self, notifications: Notification) -> Self {
        self.notifications = notifications;
        self
    }

    /// Start with delivery paused
    pub fn paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    /// Run `callback` on the monitor thread for every event, before it
    /// reaches the event stream
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Create the queue, reporting why the kernel queue could not be created
    pub fn try_build(self) -> io::Result<FileQueue> {
        let kernel = KernelQueue::new()?;
        let shared = Shared {
            kernel,
            registry: Mutex::new(Registry::new(self.paused)),
            sink: Sink::new(self.callback),
            poll_interval: self.poll_interval,
        };
        debug!(interval = ?self.poll_interval, notifications = %self.notifications, "queue created");

        Ok(FileQueue {
            shared: Arc::new(shared),
            notifications: self.notifications,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Create the queue; `None` if the kernel queue could not be created
    pub fn build(self) -> Option<FileQueue> {
        match self.try_build() {
            Ok(queue) => Some(queue),
            Err(err) => {
                error!(%err, "failed to create kernel queue");
                None
            }
        }
    }
}

impl fmt::Debug for QueueBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueBuilder")
            .field("poll_interval", &self.poll_interval)
            .field("notifications", &self.notifications)
            .field("paused", &self.paused)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Watches individually registered paths for changes
///
/// Each path is armed with its own kernel watch; a directory reports changes
/// to its own entry, never to the files inside it. Events reach the optional
/// callback and then the [`EventStream`] returned by [`FileQueue::events`].
///
/// All methods take `&self` and may be called from any thread. Call
/// [`FileQueue::shutdown`] (or drop the queue) to stop the monitor thread and
/// release every descriptor.
pub struct FileQueue {
    shared: Arc<Shared>,
    /// Kinds armed by `watch`
    notifications: Notification,
    shut_down: AtomicBool,
}

impl FileQueue {
    /// Queue with the default interval and no callback
    pub fn new() -> Option<Self> {
        QueueBuilder::new().build()
    }

    pub fn builder() -> QueueBuilder {
        QueueBuilder::new()
    }

    /// Watch `path` for the queue's default kinds
    pub fn watch(&self, path: impl AsRef<Path>) -> Result<(), WatchError> {
        self.watch_with(path, self.notifications)
    }

    /// Watch `path` for `notifications`
    ///
    /// Watching a path that is already watched succeeds without changing the
    /// kinds armed the first time.
    pub fn watch_with(&self, path: impl AsRef<Path>, notifications: Notification) -> Result<(), WatchError> {
        let path = path.as_ref();

        let unsupported = notifications.unsupported();
        if !unsupported.is_empty() {
            return Err(WatchError::Unsupported {
                path: path.to_path_buf(),
                kinds: unsupported,
            });
        }

        let mut registry = self.shared.registry.lock();
        if registry.contains(path) {
            trace!(path = %path.display(), "already watching");
            return Ok(());
        }

        let watch = self.shared.kernel.arm(path, notifications)?;
        let descriptor = watch.descriptor();
        registry.insert(path.to_path_buf(), watch, notifications);

        if !registry.has_monitor() {
            let id = registry.next_monitor_id();
            match MonitorHandle::spawn(Arc::clone(&self.shared), id) {
                Ok(handle) => registry.install_monitor(handle),
                Err(source) => {
                    if let Some(watch) = registry.remove(path) {
                        self.shared.kernel.disarm(watch);
                    }
                    return Err(WatchError::MonitorUnavailable { source });
                }
            }
        }

        debug!(path = %path.display(), %descriptor, %notifications, "watching");
        Ok(())
    }

    /// Watch the local path named by a `file:` URL
    pub fn watch_url(&self, url: &Url) -> Result<(), WatchError> {
        self.watch_url_with(url, self.notifications)
    }

    pub fn watch_url_with(&self, url: &Url, notifications: Notification) -> Result<(), WatchError> {
        let path = target::path_from_url(url)?;
        self.watch_with(path, notifications)
    }

    /// Stop watching `path`; does nothing if it is not watched
    pub fn stop_watching(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let handle = {
            let mut registry = self.shared.registry.lock();
            let Some(watch) = registry.remove(path) else {
                return;
            };
            self.shared.kernel.disarm(watch);
            debug!(path = %path.display(), "stopped watching");

            if registry.is_empty() {
                registry.take_monitor()
            } else {
                None
            }
        };

        if let Some(handle) = handle {
            handle.cancel();
        }
    }

    /// Stop watching the path named by a `file:` URL
    pub fn stop_watching_url(&self, url: &Url) {
        if let Ok(path) = target::path_from_url(url) {
            self.stop_watching(path);
        }
    }

    /// Stop watching every path and stop the monitor loop
    pub fn stop_watching_all(&self) {
        if let Some(handle) = self.unwatch_all() {
            handle.cancel();
        }
    }

    fn unwatch_all(&self) -> Option<MonitorHandle> {
        let mut registry = self.shared.registry.lock();
        let watches = registry.drain();
        if !watches.is_empty() {
            debug!(count = watches.len(), "stopped watching all paths");
        }
        for watch in watches {
            self.shared.kernel.disarm(watch);
        }
        registry.take_monitor()
    }

    /// Discard events until [`FileQueue::resume`]; nothing is replayed
    pub fn pause(&self) {
        self.shared.registry.lock().set_paused(true);
        debug!("delivery paused");
    }

    pub fn resume(&self) {
        self.shared.registry.lock().set_paused(false);
        debug!("delivery resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.shared.registry.lock().is_paused()
    }

    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        self.shared.registry.lock().contains(path.as_ref())
    }

    pub fn is_watching_url(&self, url: &Url) -> bool {
        target::path_from_url(url).is_ok_and(|path| self.is_watching(path))
    }

    /// Snapshot of the watched paths, in the order they were added
    pub fn paths(&self) -> Vec<PathBuf> {
        self.shared.registry.lock().paths()
    }

    /// Kernel handle behind `path` (diagnostics only)
    pub fn file_descriptor(&self, path: impl AsRef<Path>) -> Option<Descriptor> {
        self.shared.registry.lock().descriptor(path.as_ref())
    }

    /// Kinds armed for `path`
    pub fn notifications(&self, path: impl AsRef<Path>) -> Option<Notification> {
        self.shared.registry.lock().notifications(path.as_ref())
    }

    pub fn status(&self) -> MonitorStatus {
        self.shared.registry.lock().status()
    }

    /// The queue's event stream
    pub fn events(&self) -> EventStream {
        self.shared.sink.subscribe()
    }

    /// Stop the monitor loop, release every watch, end the event stream,
    /// and close the kernel queue
    ///
    /// Later calls do nothing. After shutdown every `watch` fails with
    /// `RegisterFailed`.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(handle) = self.unwatch_all() {
            handle.stop();
        }
        self.shared.sink.finish();
        self.shared.kernel.close();
        debug!("queue shut down");
    }
}

impl Drop for FileQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Display for FileQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths = self.paths();
        if paths.is_empty() {
            return f.write_str("FileQueue(watching: none)");
        }

        let joined = paths
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "FileQueue(watching: {joined})")
    }
}

impl fmt::Debug for FileQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.shared.registry.lock();
        f.debug_struct("FileQueue")
            .field("paths", &registry.paths())
            .field("paused", &registry.is_paused())
            .field("status", &registry.status())
            .field("poll_interval", &self.shared.poll_interval)
            .finish()
    }
}
