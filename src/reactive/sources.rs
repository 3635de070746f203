//! Leaf sources for the reactive pipeline.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::trace;

use super::{resolved, AsyncSequence, Emitter};
use crate::error::{Error, Result};

impl<T: Send + 'static> AsyncSequence<T> {
    /// An asynchronous sequence over fixed elements.
    pub fn of<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::from_iter(items)
    }

    /// Adapt any iterable into an asynchronous sequence.
    ///
    /// Elements are delivered from one spawned task, in order, yielding
    /// between elements so cancellation interleaves even with an infinite
    /// iterator.
    pub fn from_iter<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let iter = iterable.into_iter();
        AsyncSequence::from_subscribe(move |emitter: Emitter<T>| {
            tokio::spawn(async move {
                for item in iter {
                    if emitter.is_finished() {
                        break;
                    }
                    emitter.item(item);
                    tokio::task::yield_now().await;
                }
                emitter.complete();
            });
        })
    }

    /// A single-value source backed by a future.
    ///
    /// A failing future propagates through the error slot; cancellation
    /// abandons the await.
    pub fn from_future<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        AsyncSequence::from_subscribe(move |emitter: Emitter<T>| {
            let done = emitter.shared().done_rx();
            tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = resolved(done) => {}
                    value = future => match value {
                        Ok(item) => {
                            emitter.item(item);
                            emitter.complete();
                        }
                        Err(error) => emitter.error(error),
                    }
                }
            });
        })
    }

    /// A fan-out source: each element is dispatched on its own worker task,
    /// at most `workers` in flight, so downstream stages see genuinely
    /// concurrent deliveries.
    ///
    /// Fails fast with [`Error::InvalidArgument`] when `workers` is zero.
    pub fn forked<I>(items: I, workers: usize) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        if workers == 0 {
            return Err(Error::InvalidArgument(
                "forked source needs at least one worker".into(),
            ));
        }
        let iter = items.into_iter();
        Ok(AsyncSequence::from_subscribe(move |emitter: Emitter<T>| {
            tokio::spawn(async move {
                let slots = Arc::new(Semaphore::new(workers));
                let mut deliveries = FuturesUnordered::new();
                for item in iter {
                    if emitter.is_finished() {
                        break;
                    }
                    let permit = match slots.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let worker = emitter.clone();
                    deliveries.push(tokio::spawn(async move {
                        let _permit = permit;
                        worker.item(item);
                    }));
                }
                // Completion only after every dispatched delivery landed.
                while deliveries.next().await.is_some() {}
                trace!("forked source drained");
                emitter.complete();
            });
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[tokio::test]
    async fn from_iter_preserves_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        AsyncSequence::from_iter(0..5)
            .subscribe(move |n| sink.lock().unwrap().push(n))
            .wait()
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn from_future_delivers_one_item() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        AsyncSequence::from_future(async { Ok(41) })
            .map(|n| n + 1)
            .subscribe(move |n| {
                assert_eq!(n, 42);
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .wait()
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forked_delivers_everything() {
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let sink = seen.clone();
        AsyncSequence::forked(0..50, 8)
            .unwrap()
            .subscribe(move |n| {
                sink.lock().unwrap().insert(n);
            })
            .wait()
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn forked_rejects_zero_workers() {
        match AsyncSequence::forked(0..3, 0) {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("expected InvalidArgument, got {:?}", other.map(|_| ())),
        }
    }
}
