//! Event delivery: kinds reported per change, pause/resume, stream lifecycle

use crate::common::{
    append, assert_finished, assert_quiet, fast_queue, next_event, touch, wait_for, EVENT_TIMEOUT, FAST_POLL,
};
use filetime::FileTime;
use futures::StreamExt;
use kwatch::{Event, FileQueue, MonitorStatus, Notification};
use parking_lot::Mutex;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Long enough for the monitor loop to drain (and discard) pending reports
const SETTLE: Duration = Duration::from_millis(200);

#[tokio::test]
async fn test_append_reports_write() {
    let temp_dir = TempDir::new().unwrap();
    let path = touch(&temp_dir, "app.log");
    let queue = fast_queue();
    let events = queue.events();

    queue
        .watch_with(&path, Notification::WRITE | Notification::EXTEND)
        .unwrap();

    for line in ["one", "two", "three"] {
        append(&path, line);
        let event = wait_for(&events, &path, Notification::WRITE).await;
        assert_eq!(event.path(), path.as_path());
        assert!((Notification::WRITE | Notification::EXTEND).contains(event.notification));
    }
    assert_quiet(&events).await;
}

#[tokio::test]
async fn test_reports_only_armed_kinds() {
    let temp_dir = TempDir::new().unwrap();
    let path = touch(&temp_dir, "a.txt");
    let queue = fast_queue();
    let events = queue.events();

    queue.watch_with(&path, Notification::DELETE).unwrap();

    append(&path, "ignored");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
    assert_quiet(&events).await;

    fs::remove_file(&path).unwrap();
    let event = next_event(&events).await.expect("delete event");
    assert_eq!(event.notification, Notification::DELETE);
}

#[tokio::test]
async fn test_delete_reports_delete() {
    let temp_dir = TempDir::new().unwrap();
    let path = touch(&temp_dir, "a.txt");
    let queue = fast_queue();
    let events = queue.events();
    queue.watch(&path).unwrap();

    fs::remove_file(&path).unwrap();
    wait_for(&events, &path, Notification::DELETE).await;

    // The registration outlives the file until it is removed
    assert!(queue.is_watching(&path));
    queue.stop_watching(&path);
    assert!(!queue.is_watching(&path));
}

#[tokio::test]
async fn test_rename_reports_original_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = touch(&temp_dir, "a.txt");
    let renamed = temp_dir.path().join("b.txt");
    let queue = fast_queue();
    let events = queue.events();
    queue.watch(&path).unwrap();

    fs::rename(&path, &renamed).unwrap();

    let event = wait_for(&events, &path, Notification::RENAME).await;
    assert_eq!(event.path, path);
}

#[tokio::test]
async fn test_attribute_changes_report_attrib() {
    let temp_dir = TempDir::new().unwrap();
    let path = touch(&temp_dir, "a.txt");
    let queue = fast_queue();
    let events = queue.events();
    queue.watch_with(&path, Notification::ATTRIB).unwrap();

    fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
    let event = wait_for(&events, &path, Notification::ATTRIB).await;
    assert_eq!(event.notification, Notification::ATTRIB);

    tokio::time::sleep(FAST_POLL * 4).await;
    let stamp = FileTime::from_unix_time(1_000_000, 0);
    filetime::set_file_times(&path, stamp, stamp).unwrap();
    wait_for(&events, &path, Notification::ATTRIB).await;
}

#[tokio::test]
async fn test_directory_reports_entry_changes_only() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("logs");
    fs::create_dir(&dir).unwrap();
    let existing = dir.join("existing.log");
    fs::write(&existing, b"data\n").unwrap();

    let queue = fast_queue();
    let events = queue.events();
    queue.watch(&dir).unwrap();

    // Content changes inside the directory do not touch its entry
    append(&existing, "more");
    assert_quiet(&events).await;

    fs::write(dir.join("new.log"), b"hello\n").unwrap();
    let event = wait_for(&events, &dir, Notification::WRITE).await;
    assert_eq!(event.path, dir);
}

#[tokio::test]
async fn test_pause_discards_without_replay() {
    let temp_dir = TempDir::new().unwrap();
    let path = touch(&temp_dir, "a.txt");
    let queue = fast_queue();
    let events = queue.events();
    queue.watch_with(&path, Notification::WRITE).unwrap();

    queue.pause();
    assert!(queue.is_paused());
    append(&path, "while paused");
    tokio::time::sleep(SETTLE).await;

    queue.resume();
    assert!(!queue.is_paused());
    assert_quiet(&events).await;

    append(&path, "after resume");
    wait_for(&events, &path, Notification::WRITE).await;
}

#[tokio::test]
async fn test_builder_paused_start() {
    let temp_dir = TempDir::new().unwrap();
    let path = touch(&temp_dir, "a.txt");
    let queue = FileQueue::builder()
        .poll_interval(FAST_POLL)
        .paused(true)
        .build()
        .unwrap();
    let events = queue.events();
    queue.watch(&path).unwrap();

    append(&path, "dropped");
    assert_quiet(&events).await;

    queue.resume();
    append(&path, "kept");
    wait_for(&events, &path, Notification::WRITE).await;
}

#[tokio::test]
async fn test_callback_runs_before_stream() {
    let temp_dir = TempDir::new().unwrap();
    let path = touch(&temp_dir, "a.txt");
    let seen: Arc<Mutex<Vec<Event>>> = Arc::default();
    let recorder = Arc::clone(&seen);

    let queue = FileQueue::builder()
        .poll_interval(FAST_POLL)
        .callback(move |event| recorder.lock().push(event.clone()))
        .build()
        .unwrap();
    let events = queue.events();
    queue.watch_with(&path, Notification::WRITE).unwrap();

    append(&path, "line");
    let event = next_event(&events).await.expect("write event");

    assert!(seen.lock().contains(&event));
}

#[tokio::test]
async fn test_callback_may_unwatch_from_monitor_thread() {
    let temp_dir = TempDir::new().unwrap();
    let path = touch(&temp_dir, "a.txt");
    let queue: Arc<Mutex<Option<Arc<FileQueue>>>> = Arc::default();
    let handle = Arc::clone(&queue);

    let file_queue = Arc::new(
        FileQueue::builder()
            .poll_interval(FAST_POLL)
            .callback(move |event| {
                if let Some(queue) = handle.lock().as_ref() {
                    queue.stop_watching(&event.path);
                }
            })
            .build()
            .unwrap(),
    );
    *queue.lock() = Some(Arc::clone(&file_queue));
    let events = file_queue.events();
    file_queue.watch_with(&path, Notification::WRITE).unwrap();

    append(&path, "line");
    wait_for(&events, &path, Notification::WRITE).await;
    assert!(!file_queue.is_watching(&path));
    assert_finished(&events).await;

    // Break the cycle between the callback and the queue
    queue.lock().take();
}

#[tokio::test]
async fn test_panicking_callback_ends_loop_cleanly() {
    let temp_dir = TempDir::new().unwrap();
    let first = touch(&temp_dir, "first.txt");
    let second = touch(&temp_dir, "second.txt");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let queue = FileQueue::builder()
        .poll_interval(FAST_POLL)
        .callback(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("callback failure");
            }
        })
        .build()
        .unwrap();
    let events = queue.events();
    queue.watch_with(&first, Notification::WRITE).unwrap();

    append(&first, "boom");
    assert_finished(&events).await;
    assert_eq!(queue.status(), MonitorStatus::Idle);
    assert!(queue.is_watching(&first));

    // The next watch starts a live loop again
    queue.watch_with(&second, Notification::WRITE).unwrap();
    assert_eq!(queue.status(), MonitorStatus::Running);
    append(&second, "after");
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(FAST_POLL).await;
        }
    })
    .await
    .expect("callback not reached by the new loop");
}

#[tokio::test]
async fn test_stream_finishes_after_last_unwatch() {
    let temp_dir = TempDir::new().unwrap();
    let path = touch(&temp_dir, "a.txt");
    let queue = fast_queue();
    let mut events = Box::pin(queue.events());
    queue.watch(&path).unwrap();

    queue.stop_watching(&path);

    let next = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("stream did not finish in time");
    assert!(next.is_none());
    assert!(events.is_finished());
}

#[tokio::test]
async fn test_stream_finishes_on_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    let path = touch(&temp_dir, "a.txt");
    let queue = fast_queue();
    let events = queue.events();
    queue.watch(&path).unwrap();

    queue.shutdown();
    assert_finished(&events).await;
}

#[tokio::test]
async fn test_stream_finishes_when_queue_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let path = touch(&temp_dir, "a.txt");
    let queue = fast_queue();
    let events = queue.events();
    queue.watch(&path).unwrap();

    drop(queue);
    assert_finished(&events).await;
}

#[tokio::test]
async fn test_events_from_several_paths() {
    let temp_dir = TempDir::new().unwrap();
    let a = touch(&temp_dir, "a.txt");
    let b = touch(&temp_dir, "b.txt");
    let queue = fast_queue();
    let events = queue.events();
    queue.watch_with(&a, Notification::WRITE).unwrap();
    queue.watch_with(&b, Notification::WRITE).unwrap();

    append(&b, "b");
    wait_for(&events, &b, Notification::WRITE).await;
    append(&a, "a");
    wait_for(&events, &a, Notification::WRITE).await;

    queue.stop_watching(&a);
    append(&a, "unwatched");
    assert_quiet(&events).await;

    append(&b, "still watched");
    let event = next_event(&events).await.expect("write event");
    assert_eq!(event.path, b);
}
