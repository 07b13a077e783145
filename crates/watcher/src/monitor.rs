//! Background monitor loop
//!
//! One thread per queue, started with the first watched path:
//! - Drains the kernel queue with zero-wait polls until it is empty
//! - Resolves descriptors to paths under the registry lock
//! - Delivers (or, while paused, discards) the resulting events
//! - Sleeps on its stop channel between drain passes, so cancellation
//!   wakes it immediately
//!
//! The kernel poll never runs under the registry lock.

use crate::platform::{RawBatch, BATCH_SIZE};
use crate::queue::Shared;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use kwatch_core::Event;
use nix::errno::Errno;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

const THREAD_NAME: &str = "kwatch-monitor";

/// State of a queue's monitor loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    /// No loop is running (nothing watched, or the queue was shut down)
    Idle,
    /// A loop is polling the kernel queue
    Running,
    /// The last loop stopped on a kernel poll error
    Failed { code: i32 },
}

/// Why a loop exited
#[derive(Debug)]
enum Exit {
    Cancelled,
    Emptied,
    Failed(Errno),
}

/// Handle to a running monitor loop
pub(crate) struct MonitorHandle {
    id: u64,
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn spawn(shared: Arc<Shared>, id: u64) -> io::Result<Self> {
        let (stop, stop_rx) = crossbeam_channel::bounded(1);
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(shared, id, stop_rx))?;
        Ok(Self { id, stop, thread })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation without waiting for the loop to exit
    pub fn cancel(self) {
        // Dropping the sender disconnects the stop channel; dropping the
        // join handle detaches the thread
        drop(self);
    }

    /// Request cancellation and wait for the loop to exit
    ///
    /// Does not wait when called from the loop's own thread (from the
    /// callback), since that would never return.
    pub fn stop(self) {
        let Self { id, stop, thread } = self;
        drop(stop);

        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            warn!(monitor = id, "monitor thread panicked");
        }
    }
}

/// Finalizes a loop however it ends, including a panic in the callback
struct ExitGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(monitor = self.id, "event callback panicked, monitor loop stopped");
            // Lets the next `watch` start a fresh loop
            let own_handle = self.shared.registry.lock().take_monitor_if(self.id);
            drop(own_handle);
        }
        self.shared.sink.finish();
    }
}

fn run(shared: Arc<Shared>, id: u64, stop: Receiver<()>) {
    let _guard = ExitGuard { shared: &shared, id };
    debug!(monitor = id, interval = ?shared.poll_interval, "monitor loop started");

    let exit = loop {
        if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
            break Exit::Cancelled;
        }
        if shared.registry.lock().is_empty() {
            break Exit::Emptied;
        }
        if let Err(errno) = drain(&shared) {
            break Exit::Failed(errno);
        }
        match stop.recv_timeout(shared.poll_interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break Exit::Cancelled,
        }
    };

    match exit {
        Exit::Failed(errno) => {
            error!(monitor = id, %errno, "kernel queue poll failed, monitor loop stopped");
            let own_handle = {
                let mut registry = shared.registry.lock();
                registry.record_failure(errno);
                registry.take_monitor_if(id)
            };
            // Dropping our own handle only detaches this thread
            drop(own_handle);
        }
        reason => debug!(monitor = id, ?reason, "monitor loop stopped"),
    }
}

/// Poll until the kernel queue is empty, delivering what it reports
///
/// Reports accumulate across polls and are resolved once the queue is empty
/// or a full batch is pending, so a backend that folds per descriptor folds
/// across the whole pass.
fn drain(shared: &Shared) -> Result<(), Errno> {
    let mut batch = RawBatch::new();
    let mut events = Vec::with_capacity(BATCH_SIZE);

    loop {
        let drained = match shared.kernel.poll(&mut batch) {
            Ok(0) => true,
            Ok(_) => false,
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(errno),
        };
        if !drained && batch.len() < BATCH_SIZE {
            continue;
        }

        {
            let registry = shared.registry.lock();
            for raw in &batch {
                // Gone: unwatched between the poll and this lookup. On kqueue
                // a descriptor number closed by `stop_watching` and reused by
                // a later `watch` in that window resolves to the new path.
                let Some((path, armed)) = registry.resolve(raw.descriptor) else {
                    continue;
                };
                let notification = raw.notification & armed;
                if notification.is_empty() {
                    continue;
                }
                if registry.is_paused() {
                    trace!(path = %path.display(), %notification, "paused, discarding event");
                    continue;
                }
                events.push(Event::new(path, notification));
            }
        }
        batch.clear();

        // The callback may call back into the queue, so deliver unlocked
        for event in events.drain(..) {
            shared.sink.deliver(event);
        }

        if drained {
            return Ok(());
        }
    }
}
