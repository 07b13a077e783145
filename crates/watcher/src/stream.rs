//! Asynchronous event sequence

use async_channel::Receiver;
use futures::Stream;
use kwatch_core::Event;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Events of one queue, in delivery order
    ///
    /// Clones read the same sequence: each event goes to exactly one reader.
    /// The sequence ends once the monitor loop stops (last path unwatched,
    /// `shutdown`, or a fatal poll error) and buffered events are drained.
    #[derive(Debug, Clone)]
    pub struct EventStream {
        #[pin]
        rx: Receiver<Event>,
    }
}

impl EventStream {
    pub(crate) fn new(rx: Receiver<Event>) -> Self {
        Self { rx }
    }

    /// Wait for the next event; `None` once the stream has ended
    pub async fn recv(&self) -> Option<Event> {
        self.rx.recv().await.ok()
    }

    /// Block the current thread until the next event
    pub fn recv_blocking(&self) -> Option<Event> {
        self.rx.recv_blocking().ok()
    }

    /// Next buffered event, if any
    pub fn try_recv(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Events buffered and not yet received
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// True once the stream has ended and every buffered event was received
    pub fn is_finished(&self) -> bool {
        self.rx.is_closed() && self.rx.is_empty()
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().rx.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rx.size_hint()
    }
}
