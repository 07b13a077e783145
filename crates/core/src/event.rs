//! Events delivered for watched paths

use crate::notification::Notification;
use std::fmt;
use std::path::{Path, PathBuf};

/// A change reported for one watched path
///
/// Several kernel reports for the same path between two drain passes arrive
/// as one event carrying the union of their kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Path as it was passed to `watch`
    pub path: PathBuf,
    /// Kinds reported, limited to the kinds armed for `path`
    pub notification: Notification,
}

impl Event {
    /// Create a new event
    pub fn new(path: impl Into<PathBuf>, notification: Notification) -> Self {
        Self {
            path: path.into(),
            notification,
        }
    }

    /// Path that changed
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if any of `kinds` was reported
    pub fn is(&self, kinds: Notification) -> bool {
        self.notification.intersects(kinds)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.notification)
    }
}
