//! Fan-out/fan-in combinators over nested asynchronous sequences.
//!
//! `flat_map_concat` drains one inner subscription at a time and preserves
//! global order; `flat_map_merge` subscribes to every inner as outer items
//! arrive and lets deliveries interleave. Both complete the downstream
//! subscription exactly once and propagate the first error, cancelling every
//! remaining branch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::trace;

use super::{lock_unpoisoned, resolved, AsyncSequence, CompletionHandle, Emitter};
use crate::error::{panic_message, Error};

/// Shared fan-in bookkeeping for one merge subscription.
///
/// `outstanding` starts at one for the outer subscription and is incremented
/// per spawned inner; the branch that decrements it to zero signals
/// completion. Errors bypass the counter: the first one resolves the
/// downstream subscription, which in turn cancels every live sibling. A
/// finished branch removes itself from `children`, so the roster stays
/// proportional to the branches actually in flight.
struct MergeCore<U> {
    outstanding: AtomicUsize,
    down: Emitter<U>,
    children: Mutex<Vec<CompletionHandle>>,
}

impl<U: Send + 'static> MergeCore<U> {
    fn new(down: Emitter<U>) -> Arc<Self> {
        Arc::new(Self {
            outstanding: AtomicUsize::new(1),
            down,
            children: Mutex::new(Vec::new()),
        })
    }

    /// Track a live inner subscription for cancellation.
    fn adopt(&self, handle: CompletionHandle) {
        lock_unpoisoned(&self.children).push(handle);
        // Resolution may have swept the roster between spawn and adopt.
        if self.down.is_finished() {
            self.cancel_children();
        }
    }

    fn discard(&self, handle: &CompletionHandle) {
        lock_unpoisoned(&self.children).retain(|child| !child.same_subscription(handle));
    }

    fn cancel_children(&self) {
        let children = std::mem::take(&mut *lock_unpoisoned(&self.children));
        for child in children {
            child.cancel();
        }
    }

    fn branch_done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            trace!("last merge branch finished");
            self.down.complete();
        }
    }

    fn branch_failed(&self, error: Error) {
        // First error wins; the resolve CAS discards later siblings.
        self.down.error(error);
    }
}

impl<T: Send + 'static> AsyncSequence<T> {
    /// Map each item to an inner asynchronous sequence and fully drain it
    /// before touching the next item: global order is preserved and at most
    /// one inner subscription is in flight.
    pub fn flat_map_concat<U, F>(self, f: F) -> AsyncSequence<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> AsyncSequence<U> + Send + 'static,
    {
        AsyncSequence::from_subscribe(move |down: Emitter<U>| {
            // Outer items queue here while the current inner drains.
            let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<T>();
            let outer = self.subscribe(move |item| {
                let _ = queue_tx.send(item);
            });

            // One hook covers the outer and whichever inner is current.
            let current: Arc<Mutex<Option<CompletionHandle>>> = Arc::new(Mutex::new(None));
            down.shared().register_cancel({
                let outer = outer.clone();
                let current = current.clone();
                Box::new(move || {
                    outer.cancel();
                    if let Some(inner) = lock_unpoisoned(&current).take() {
                        inner.cancel();
                    }
                })
            });

            // An outer error cuts through eagerly, ahead of queued items.
            {
                let outer = outer.clone();
                let down = down.clone();
                tokio::spawn(async move {
                    if let Err(error) = outer.wait().await {
                        if !matches!(error, Error::Canceled) {
                            down.error(error);
                        }
                    }
                });
            }

            let mut f = f;
            let done = down.shared().done_rx();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = resolved(done.clone()) => {
                            outer.cancel();
                            break;
                        }
                        next = queue_rx.recv() => match next {
                            Some(item) => {
                                let inner = match panic::catch_unwind(AssertUnwindSafe(|| f(item))) {
                                    Ok(inner) => inner,
                                    Err(payload) => {
                                        down.error(Error::Callback(panic_message(payload)));
                                        break;
                                    }
                                };
                                let forward = {
                                    let down = down.clone();
                                    inner.subscribe(move |item| down.item(item))
                                };
                                *lock_unpoisoned(&current) = Some(forward.clone());
                                if down.is_finished() {
                                    // Resolution raced the hand-over.
                                    if let Some(inner) = lock_unpoisoned(&current).take() {
                                        inner.cancel();
                                    }
                                    break;
                                }
                                let outcome = forward.wait().await;
                                lock_unpoisoned(&current).take();
                                match outcome {
                                    Ok(()) => {}
                                    Err(Error::Canceled) => break,
                                    Err(error) => {
                                        down.error(error);
                                        break;
                                    }
                                }
                            }
                            // The queue closes once the outer subscription
                            // dropped its sender, i.e. after resolution. An
                            // outer error was already propagated eagerly.
                            None => {
                                if outer.wait().await.is_ok() {
                                    down.complete();
                                }
                                break;
                            }
                        }
                    }
                }
            });
        })
    }

    /// Map each item to an inner asynchronous sequence and subscribe to it
    /// immediately: deliveries from all active inners interleave.
    ///
    /// The merged subscription completes only once the outer *and* every
    /// spawned inner completed. Any branch error propagates downstream and
    /// cancels all sibling subscriptions; later errors are discarded once
    /// resolution has begun. No item from a cancelled branch reaches the
    /// handler once cancellation is observed.
    pub fn flat_map_merge<U, F>(self, f: F) -> AsyncSequence<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> AsyncSequence<U> + Send + 'static,
    {
        AsyncSequence::from_subscribe(move |down: Emitter<U>| {
            let core = MergeCore::new(down.clone());
            let f = Mutex::new(f);

            let outer = {
                let core = core.clone();
                self.subscribe(move |item| {
                    if core.down.is_finished() {
                        return;
                    }
                    let inner = match core.down.guarded(|| (&mut *lock_unpoisoned(&f))(item)) {
                        Some(inner) => inner,
                        None => return,
                    };

                    core.outstanding.fetch_add(1, Ordering::AcqRel);
                    trace!("merge branch spawned");
                    let forward = {
                        let down = core.down.clone();
                        inner.subscribe(move |item| down.item(item))
                    };
                    core.adopt(forward.clone());

                    let core = core.clone();
                    tokio::spawn(async move {
                        let outcome = forward.wait().await;
                        core.discard(&forward);
                        match outcome {
                            Ok(()) => core.branch_done(),
                            Err(Error::Canceled) => {}
                            Err(error) => core.branch_failed(error),
                        }
                    });
                })
            };

            down.shared().register_cancel({
                let core = core.clone();
                let outer = outer.clone();
                Box::new(move || {
                    outer.cancel();
                    core.cancel_children();
                })
            });
            tokio::spawn(async move {
                match outer.wait().await {
                    Ok(()) => core.branch_done(),
                    Err(Error::Canceled) => {}
                    Err(error) => core.branch_failed(error),
                }
            });
        })
    }
}
