//! `futures::Stream` boundary adapter.
//!
//! Thin host-interop shim: items and the terminal error of a subscription
//! are forwarded into a channel and polled back out as a stream. Dropping
//! the stream cancels the subscription.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::{AsyncSequence, CompletionHandle};
use crate::error::Result;

/// Stream over the items of a subscription; see
/// [`AsyncSequence::into_stream`].
pub struct ItemStream<T> {
    rx: mpsc::UnboundedReceiver<Result<T>>,
    handle: CompletionHandle,
}

impl<T> Stream for ItemStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<T> ItemStream<T> {
    /// The completion handle of the underlying subscription.
    pub fn handle(&self) -> &CompletionHandle {
        &self.handle
    }
}

impl<T> Drop for ItemStream<T> {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

impl<T: Send + 'static> AsyncSequence<T> {
    /// Subscribe and expose the items as a `futures::Stream`.
    ///
    /// The stream yields `Ok(item)` per delivery and, after a failure, one
    /// final `Err` before ending. Cancellation ends the stream without an
    /// error item.
    pub fn into_stream(self) -> ItemStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let error_tx = tx.clone();
        let handle = self.subscribe_with(
            move |item| {
                let _ = tx.send(Ok(item));
            },
            move |error| {
                let _ = error_tx.send(Err(error));
            },
        );
        ItemStream { rx, handle }
    }
}
