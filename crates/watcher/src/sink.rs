//! Delivery sink: synchronous callback plus the event stream

use crate::stream::EventStream;
use async_channel as chan;
use kwatch_core::Event;
use tracing::{debug, trace};

/// Synchronous callback run on the monitor thread for every event
///
/// It shares the polling path with every other watched path; keep it short.
pub type Callback = Box<dyn Fn(&Event) + Send + Sync + 'static>;

pub(crate) struct Sink {
    callback: Option<Callback>,
    tx: chan::Sender<Event>,
    rx: chan::Receiver<Event>,
}

impl Sink {
    pub fn new(callback: Option<Callback>) -> Self {
        let (tx, rx) = chan::unbounded();
        Self { callback, tx, rx }
    }

    /// Hand one event to the callback, then to the stream
    pub fn deliver(&self, event: Event) {
        trace!(path = %event.path.display(), notification = %event.notification, "delivering event");

        if let Some(callback) = &self.callback {
            callback(&event);
        }
        // Fails only once the stream is finished; the callback still saw it
        let _ = self.tx.try_send(event);
    }

    /// Mark the stream complete; later calls do nothing
    pub fn finish(&self) {
        if self.tx.close() {
            debug!(buffered = self.rx.len(), "event stream finished");
        }
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.rx.clone())
    }
}
