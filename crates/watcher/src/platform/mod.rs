//! Platform-specific kernel queues
//!
//! Both backends expose the same surface:
//! - `KernelQueue::new()` creates the queue descriptor
//! - `arm()` opens a path and registers an edge-triggered watch
//! - `disarm()` releases a watch
//! - `poll()` pulls one batch of reports without waiting
//! - `close()` releases the queue descriptor

#[cfg(any(
    target_vendor = "apple",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod kqueue;

#[cfg(any(
    target_vendor = "apple",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub(crate) use self::kqueue::{KernelQueue, Watch};

#[cfg(any(target_os = "linux", target_os = "android"))]
mod inotify;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) use self::inotify::{KernelQueue, Watch};

#[cfg(not(any(
    target_vendor = "apple",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    target_os = "linux",
    target_os = "android"
)))]
compile_error!("kwatch requires kqueue or inotify");

use kwatch_core::{Notification, WatchError};
use nix::errno::Errno;
use smallvec::SmallVec;
use std::ffi::CString;
use std::fmt;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Most kernel reports pulled by one `poll` call
pub(crate) const BATCH_SIZE: usize = 16;

/// Raw reports from one `poll` call
pub(crate) type RawBatch = SmallVec<[RawEvent; BATCH_SIZE]>;

/// Kernel-level handle of a watched path
///
/// A file descriptor on kqueue platforms, an inotify watch descriptor on
/// Linux. Exposed for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor(RawFd);

impl Descriptor {
    pub(crate) fn from_raw(raw: RawFd) -> Self {
        Self(raw)
    }

    /// The raw descriptor number
    pub fn as_raw(self) -> RawFd {
        self.0
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One kernel report, before it is resolved to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawEvent {
    pub descriptor: Descriptor,
    pub notification: Notification,
}

fn path_to_cstring(path: &Path) -> Result<CString, WatchError> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| open_failed(path, Errno::EINVAL))
}

fn open_failed(path: &Path, errno: Errno) -> WatchError {
    WatchError::OpenFailed {
        path: path.to_path_buf(),
        code: errno as i32,
    }
}

fn register_failed(path: &Path, errno: Errno) -> WatchError {
    WatchError::RegisterFailed {
        path: path.to_path_buf(),
        code: errno as i32,
    }
}
