//! Common utilities for integration tests

use kwatch::{Event, EventStream, FileQueue, Notification};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

/// Upper bound on waiting for a single event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Window in which no event may arrive
pub const QUIET_WINDOW: Duration = Duration::from_millis(300);

/// Poll interval used by test queues
pub const FAST_POLL: Duration = Duration::from_millis(5);

pub fn fast_queue() -> FileQueue {
    FileQueue::builder()
        .poll_interval(FAST_POLL)
        .build()
        .expect("kernel queue")
}

/// Create `name` under `dir` with some initial content
pub fn touch(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, b"initial\n").unwrap();
    path
}

/// Append one line with a single write
pub fn append(path: &Path, line: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(format!("{line}\n").as_bytes()).unwrap();
}

/// Next event, or `None` if the stream ended or nothing arrived in time
pub async fn next_event(stream: &EventStream) -> Option<Event> {
    timeout(EVENT_TIMEOUT, stream.recv()).await.ok().flatten()
}

/// Skip events until one for `path` carries any of `kinds`
pub async fn wait_for(stream: &EventStream, path: &Path, kinds: Notification) -> Event {
    loop {
        let event = next_event(stream)
            .await
            .unwrap_or_else(|| panic!("no {kinds} event for {}", path.display()));
        if event.path == path && event.is(kinds) {
            return event;
        }
    }
}

/// Fail if any event arrives within `QUIET_WINDOW`
pub async fn assert_quiet(stream: &EventStream) {
    if let Ok(Some(event)) = timeout(QUIET_WINDOW, stream.recv()).await {
        panic!("unexpected event: {event}");
    }
}

/// Stream ended (returns `None`) within `EVENT_TIMEOUT`
pub async fn assert_finished(stream: &EventStream) {
    let next = timeout(EVENT_TIMEOUT, stream.recv())
        .await
        .expect("stream did not finish in time");
    assert_eq!(next, None, "stream yielded an event instead of finishing");
}
