//! Wrapping operators for the reactive pipeline.
//!
//! Each operator rebuilds the subscription callback chain: subscribing to
//! the wrapped sequence subscribes upstream with an emitter that transforms
//! and forwards. All stages of a chain share one subscription state, so the
//! finished guard runs before every forwarded item; that is what lets a
//! "decided finished" stage race safely with an upstream still delivering.
//!
//! Upstream may deliver from several worker tasks at once (forked sources,
//! merged inners), so every piece of per-stage state here is a mutex or an
//! atomic.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{lock_unpoisoned, AsyncSequence, Emitter};

impl<T: Send + 'static> AsyncSequence<T> {
    /// Transform every item 1:1.
    pub fn map<U, F>(self, f: F) -> AsyncSequence<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        AsyncSequence::from_subscribe(move |down: Emitter<U>| {
            let f = Mutex::new(f);
            let up = down.wrap(move |item: T, down: &Emitter<U>| {
                if let Some(mapped) = down.guarded(|| (&mut *lock_unpoisoned(&f))(item)) {
                    down.item(mapped);
                }
            });
            self.attach(up);
        })
    }

    /// Keep only items for which `predicate` holds.
    pub fn filter<P>(self, predicate: P) -> AsyncSequence<T>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        AsyncSequence::from_subscribe(move |down: Emitter<T>| {
            let predicate = Mutex::new(predicate);
            let up = down.wrap(move |item: T, down: &Emitter<T>| {
                match down.guarded(|| (&mut *lock_unpoisoned(&predicate))(&item)) {
                    Some(true) => down.item(item),
                    Some(false) | None => {}
                }
            });
            self.attach(up);
        })
    }

    /// Filter and map in one step.
    pub fn filter_map<U, F>(self, f: F) -> AsyncSequence<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Option<U> + Send + 'static,
    {
        AsyncSequence::from_subscribe(move |down: Emitter<U>| {
            let f = Mutex::new(f);
            let up = down.wrap(move |item: T, down: &Emitter<U>| {
                if let Some(Some(mapped)) = down.guarded(|| (&mut *lock_unpoisoned(&f))(item)) {
                    down.item(mapped);
                }
            });
            self.attach(up);
        })
    }

    /// Run a side effect per item, before downstream delivery.
    pub fn on_next<F>(self, action: F) -> AsyncSequence<T>
    where
        F: FnMut(&T) + Send + 'static,
    {
        AsyncSequence::from_subscribe(move |down: Emitter<T>| {
            let action = Mutex::new(action);
            let up = down.wrap(move |item: T, down: &Emitter<T>| {
                if down
                    .guarded(|| (&mut *lock_unpoisoned(&action))(&item))
                    .is_some()
                {
                    down.item(item);
                }
            });
            self.attach(up);
        })
    }

    /// First-occurrence-wins deduplication.
    ///
    /// The membership set is mutex-guarded: upstream may deliver from
    /// multiple worker tasks concurrently.
    pub fn distinct(self) -> AsyncSequence<T>
    where
        T: Clone + Eq + Hash,
    {
        AsyncSequence::from_subscribe(move |down: Emitter<T>| {
            let seen = Mutex::new(HashSet::new());
            let up = down.wrap(move |item: T, down: &Emitter<T>| {
                let fresh = lock_unpoisoned(&seen).insert(item.clone());
                if fresh {
                    down.item(item);
                }
            });
            self.attach(up);
        })
    }

    /// Drop the first `n` items by arrival order.
    pub fn skip(self, n: usize) -> AsyncSequence<T> {
        AsyncSequence::from_subscribe(move |down: Emitter<T>| {
            let remaining = AtomicUsize::new(n);
            let up = down.wrap(move |item: T, down: &Emitter<T>| {
                let skipped = remaining
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                        count.checked_sub(1)
                    })
                    .is_ok();
                if !skipped {
                    down.item(item);
                }
            });
            self.attach(up);
        })
    }

    /// Pass items while `predicate` holds; the first failure completes the
    /// subscription and cancels upstream exactly once, even if upstream
    /// keeps delivering from other tasks meanwhile.
    pub fn take_while<P>(self, predicate: P) -> AsyncSequence<T>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        AsyncSequence::from_subscribe(move |down: Emitter<T>| {
            let predicate = Mutex::new(predicate);
            let up = down.wrap(move |item: T, down: &Emitter<T>| {
                match down.guarded(|| (&mut *lock_unpoisoned(&predicate))(&item)) {
                    Some(true) => down.item(item),
                    // Resolution is a single compare-and-swap: the decision
                    // is made once and the cancel hooks stop upstream.
                    Some(false) => down.complete(),
                    None => {}
                }
            });
            self.attach(up);
        })
    }
}
