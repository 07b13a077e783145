//! Errors surfaced by `watch`

use crate::notification::Notification;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to start watching a path
///
/// Every variant is a synchronous failure of the `watch` call that produced
/// it. The registry is left untouched; nothing is retried.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The target could not be opened for event monitoring
    #[error("failed to open {} for monitoring: {}", path.display(), os_error(*code))]
    OpenFailed { path: PathBuf, code: i32 },

    /// The kernel refused to arm the watch (the opened descriptor was closed)
    #[error("failed to register {} with the kernel queue: {}", path.display(), os_error(*code))]
    RegisterFailed { path: PathBuf, code: i32 },

    /// A path-like input that does not denote a local file
    #[error("not a local file path: {input}")]
    InvalidTarget { input: String },

    /// Requested kinds this platform cannot report
    #[error("cannot watch {} for {kinds}: not supported on this platform", path.display())]
    Unsupported { path: PathBuf, kinds: Notification },

    /// The monitor thread could not be started
    #[error("failed to start monitor thread: {source}")]
    MonitorUnavailable {
        #[source]
        source: io::Error,
    },
}

impl WatchError {
    /// OS error code, for the variants that carry one
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::OpenFailed { code, .. } | Self::RegisterFailed { code, .. } => Some(*code),
            Self::MonitorUnavailable { source } => source.raw_os_error(),
            Self::InvalidTarget { .. } | Self::Unsupported { .. } => None,
        }
    }

    /// Path the failed call was about
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::OpenFailed { path, .. }
            | Self::RegisterFailed { path, .. }
            | Self::Unsupported { path, .. } => Some(path),
            Self::InvalidTarget { .. } | Self::MonitorUnavailable { .. } => None,
        }
    }

    /// True if the target did not exist when it was opened
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::OpenFailed { code, .. }
            if io::Error::from_raw_os_error(*code).kind() == io::ErrorKind::NotFound)
    }
}

fn os_error(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}
