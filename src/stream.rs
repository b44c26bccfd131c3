//! Async stream of watch events, fed by a channel-backed sink.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::event::WatchEvent;
use crate::sink::Sink;

/// Forwards every event into an unbounded channel.
///
/// Once the receiving [`EventStream`] is dropped, `handle` returns
/// [`Error::StreamClosed`] and the watcher unregisters the sink.
pub(crate) struct ChannelSink {
    sender: mpsc::UnboundedSender<WatchEvent>,
}

impl Sink for ChannelSink {
    fn handle(&self, event: &WatchEvent) -> Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| Error::StreamClosed)
    }

    fn name(&self) -> &str {
        "event-stream"
    }
}

/// A stream of the events a watcher delivers after subscription.
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<WatchEvent>,
}

impl EventStream {
    /// Check if the sending side has gone away
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

pub(crate) fn channel() -> (ChannelSink, EventStream) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ChannelSink { sender }, EventStream { receiver })
}

impl Stream for EventStream {
    type Item = WatchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}
