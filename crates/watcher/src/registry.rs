//! Watch registry
//!
//! Owns the path <-> descriptor maps, the paused flag, and the handle of the
//! running monitor loop. Always accessed through the queue's single lock.

use crate::monitor::{MonitorHandle, MonitorStatus};
use crate::platform::{Descriptor, Watch};
use ahash::AHashMap;
use indexmap::IndexMap;
use kwatch_core::Notification;
use nix::errno::Errno;
use std::path::{Path, PathBuf};

/// A watched path
#[derive(Debug)]
struct Entry {
    watch: Watch,
    /// Kinds armed when the path was first watched
    notifications: Notification,
}

/// Registry state shared by the queue and its monitor loop
#[derive(Default)]
pub(crate) struct Registry {
    /// Watched paths, in the order they were added
    entries: IndexMap<PathBuf, Entry>,
    /// Reverse map used to resolve kernel reports
    paths: AHashMap<Descriptor, PathBuf>,
    paused: bool,
    monitor: Option<MonitorHandle>,
    next_monitor_id: u64,
    /// Poll error that stopped the last monitor loop
    failure: Option<Errno>,
}

impl Registry {
    pub fn new(paused: bool) -> Self {
        Self {
            paused,
            ..Self::default()
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, path: PathBuf, watch: Watch, notifications: Notification) {
        debug_assert!(!self.contains(&path));
        self.paths.insert(watch.descriptor(), path.clone());
        self.entries.insert(path, Entry { watch, notifications });
    }

    /// Remove `path`, handing back its watch for disarming
    pub fn remove(&mut self, path: &Path) -> Option<Watch> {
        let entry = self.entries.shift_remove(path)?;
        self.paths.remove(&entry.watch.descriptor());
        Some(entry.watch)
    }

    /// Remove every path, handing back the watches for disarming
    pub fn drain(&mut self) -> Vec<Watch> {
        self.paths.clear();
        self.entries.drain(..).map(|(_, entry)| entry.watch).collect()
    }

    /// Path and armed kinds for a reported descriptor
    pub fn resolve(&self, descriptor: Descriptor) -> Option<(&Path, Notification)> {
        let path = self.paths.get(&descriptor)?;
        let entry = self.entries.get(path)?;
        Some((path.as_path(), entry.notifications))
    }

    pub fn descriptor(&self, path: &Path) -> Option<Descriptor> {
        self.entries.get(path).map(|entry| entry.watch.descriptor())
    }

    pub fn notifications(&self, path: &Path) -> Option<Notification> {
        self.entries.get(path).map(|entry| entry.notifications)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn has_monitor(&self) -> bool {
        self.monitor.is_some()
    }

    pub fn next_monitor_id(&mut self) -> u64 {
        self.next_monitor_id += 1;
        self.next_monitor_id
    }

    pub fn install_monitor(&mut self, handle: MonitorHandle) {
        debug_assert!(self.monitor.is_none());
        self.failure = None;
        self.monitor = Some(handle);
    }

    pub fn take_monitor(&mut self) -> Option<MonitorHandle> {
        self.monitor.take()
    }

    /// Take the monitor handle only if it still belongs to loop `id`
    pub fn take_monitor_if(&mut self, id: u64) -> Option<MonitorHandle> {
        if self.monitor.as_ref().map(MonitorHandle::id) == Some(id) {
            self.monitor.take()
        } else {
            None
        }
    }

    pub fn record_failure(&mut self, errno: Errno) {
        self.failure = Some(errno);
    }

    pub fn status(&self) -> MonitorStatus {
        match (&self.monitor, self.failure) {
            (Some(_), _) => MonitorStatus::Running,
            (None, Some(errno)) => MonitorStatus::Failed { code: errno as i32 },
            (None, None) => MonitorStatus::Idle,
        }
    }
}
