//! The asynchronous reactive pipeline.
//!
//! An [`AsyncSequence`] is the subscription-based push variant of the
//! synchronous [`crate::sequence::Sequence`]: subscribing wires the operator
//! chain, returns a [`CompletionHandle`], and items flow to the handler from
//! tokio tasks until exhaustion, error, or cancellation.
//!
//! One subscription owns one shared state: a finished flag consulted before
//! every forwarded callback, an outcome slot, a completion signal, and the
//! cancel hooks that stop upstream producers. Resolution (complete, error,
//! or cancel) is a single compare-and-swap: the first resolver wins, later
//! errors are discarded, and cancellation is idempotent and safe under
//! concurrent invocation. Cancellation is cooperative: an already-scheduled
//! callback may still fire, but it must pass the finished guard before
//! reaching the user handler.
//!
//! # Example
//!
//! ```rust
//! use rill::reactive::AsyncSequence;
//! use std::sync::{Arc, Mutex};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let handle = AsyncSequence::of([1, 2, 3])
//!     .map(|n| n * 2)
//!     .subscribe(move |n| sink.lock().unwrap().push(n));
//! handle.wait().await.unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec![2, 4, 6]);
//! # }
//! ```

mod merge;
mod ops;
mod sources;
mod stream;

pub use stream::ItemStream;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use smallvec::SmallVec;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::error::{panic_message, Error, Result};

/// Lock a mutex, tolerating poisoning.
///
/// A user callback that panicked mid-delivery resolves the subscription; a
/// poisoned stage mutex must not take concurrently in-flight deliveries
/// down with a second panic.
pub(crate) fn lock_unpoisoned<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type CancelHook = Box<dyn FnOnce() + Send>;

// ============================================================================
// Subscription State
// ============================================================================

/// State shared by every stage of one subscription.
pub(crate) struct SubShared {
    finished: AtomicBool,
    outcome: Mutex<Option<Result<()>>>,
    done_tx: watch::Sender<bool>,
    cancels: Mutex<SmallVec<[CancelHook; 2]>>,
    on_error: Mutex<Option<Box<dyn FnMut(Error) + Send>>>,
}

impl SubShared {
    fn new(on_error: Option<Box<dyn FnMut(Error) + Send>>) -> Arc<Self> {
        let (done_tx, _) = watch::channel(false);
        Arc::new(Self {
            finished: AtomicBool::new(false),
            outcome: Mutex::new(None),
            done_tx,
            cancels: Mutex::new(SmallVec::new()),
            on_error: Mutex::new(on_error),
        })
    }

    /// Whether the subscription has been resolved; checked before every
    /// forwarded callback.
    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Resolve the subscription. The first resolution wins; later attempts
    /// (concurrent sibling errors, repeated cancels) are discarded.
    pub(crate) fn resolve(&self, outcome: Result<()>) -> bool {
        if self
            .finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        trace!(ok = outcome.is_ok(), "subscription resolved");

        // The error callback fires at most once; dropping the slot after
        // resolution also releases whatever the callback captured.
        let error_cb = lock_unpoisoned(&self.on_error).take();
        if let (Err(err), Some(mut cb)) = (&outcome, error_cb) {
            if !matches!(err, Error::Canceled) {
                cb(err.clone());
            }
        }

        *lock_unpoisoned(&self.outcome) = Some(outcome);

        // Stop upstream producers before announcing completion.
        let hooks = std::mem::take(&mut *lock_unpoisoned(&self.cancels));
        for hook in hooks {
            hook();
        }
        // send_replace stores the flag even while nobody is waiting yet.
        self.done_tx.send_replace(true);
        true
    }

    /// Register a hook that stops an upstream producer on resolution.
    ///
    /// A hook registered after resolution runs immediately.
    pub(crate) fn register_cancel(&self, hook: CancelHook) {
        if self.is_finished() {
            hook();
            return;
        }
        lock_unpoisoned(&self.cancels).push(hook);
        // Resolution may have drained the list between the check and the
        // push; sweep again so no hook is stranded.
        if self.is_finished() {
            for hook in std::mem::take(&mut *lock_unpoisoned(&self.cancels)) {
                hook();
            }
        }
    }

    /// A watch on the resolution flag, for cancellation-aware awaits.
    pub(crate) fn done_rx(&self) -> watch::Receiver<bool> {
        self.done_tx.subscribe()
    }
}

/// Wait until the subscription behind `rx` has been resolved.
pub(crate) async fn resolved(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

// ============================================================================
// Emitter
// ============================================================================

/// Downstream-facing delivery handle for one subscription stage.
///
/// Wrapping operators build an upstream emitter whose delivery closure
/// transforms and forwards into this one; all stages of a chain share the
/// same [`SubShared`], so the finished guard and the cancel hooks act on the
/// whole subscription.
pub(crate) struct Emitter<T> {
    deliver: Arc<dyn Fn(T) + Send + Sync>,
    shared: Arc<SubShared>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            deliver: self.deliver.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send + 'static> Emitter<T> {
    /// Deliver one item downstream, unless the subscription is finished.
    pub(crate) fn item(&self, item: T) {
        if self.shared.is_finished() {
            return;
        }
        (self.deliver)(item);
    }

    /// Signal exhaustion.
    pub(crate) fn complete(&self) {
        self.shared.resolve(Ok(()));
    }

    /// Signal an error; exactly one of item/error per delivery, and no
    /// items follow an error.
    pub(crate) fn error(&self, error: Error) {
        self.shared.resolve(Err(error));
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    pub(crate) fn shared(&self) -> &Arc<SubShared> {
        &self.shared
    }

    /// Build the upstream emitter of a wrapping operator: `f` receives each
    /// upstream item together with this emitter and forwards what it keeps.
    pub(crate) fn wrap<In: Send + 'static>(
        self,
        f: impl Fn(In, &Emitter<T>) + Send + Sync + 'static,
    ) -> Emitter<In> {
        let shared = self.shared.clone();
        Emitter {
            deliver: Arc::new(move |item| f(item, &self)),
            shared,
        }
    }

    /// Run a user callback, converting a panic into the subscription's
    /// error slot. Returns `None` when the callback panicked.
    pub(crate) fn guarded<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                self.shared
                    .resolve(Err(Error::Callback(panic_message(payload))));
                None
            }
        }
    }
}

// ============================================================================
// AsyncSequence
// ============================================================================

/// A lazy asynchronous element stream consumed through subscription.
///
/// Nothing runs until [`AsyncSequence::subscribe`] (or a convenience built
/// on it) is called; subscribing requires a tokio runtime.
pub struct AsyncSequence<T> {
    subscribe_fn: Box<dyn FnOnce(Emitter<T>) + Send>,
}

impl<T: Send + 'static> AsyncSequence<T> {
    pub(crate) fn from_subscribe(f: impl FnOnce(Emitter<T>) + Send + 'static) -> Self {
        Self {
            subscribe_fn: Box::new(f),
        }
    }

    /// Wire this sequence to an already-built emitter.
    pub(crate) fn attach(self, emitter: Emitter<T>) {
        (self.subscribe_fn)(emitter);
    }

    /// Subscribe with an item handler.
    ///
    /// Deliveries may come from multiple tokio worker tasks; the handler is
    /// internally synchronized. Errors resolve the returned handle
    /// exceptionally; use [`AsyncSequence::subscribe_with`] to observe them
    /// in a callback as well.
    pub fn subscribe<H>(self, handler: H) -> CompletionHandle
    where
        H: FnMut(T) + Send + 'static,
    {
        self.do_subscribe(handler, None)
    }

    /// Subscribe with an item handler and an error callback.
    ///
    /// Exactly one of the two is invoked per delivery; after the error
    /// callback fires once, no further items are delivered.
    pub fn subscribe_with<H, E>(self, handler: H, on_error: E) -> CompletionHandle
    where
        H: FnMut(T) + Send + 'static,
        E: FnMut(Error) + Send + 'static,
    {
        self.do_subscribe(handler, Some(Box::new(on_error)))
    }

    fn do_subscribe<H>(
        self,
        handler: H,
        on_error: Option<Box<dyn FnMut(Error) + Send>>,
    ) -> CompletionHandle
    where
        H: FnMut(T) + Send + 'static,
    {
        let shared = SubShared::new(on_error);
        let handler = Mutex::new(handler);
        let guard_shared = shared.clone();
        let deliver: Arc<dyn Fn(T) + Send + Sync> = Arc::new(move |item| {
            let call = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut handler = lock_unpoisoned(&handler);
                (&mut *handler)(item)
            }));
            if let Err(payload) = call {
                guard_shared.resolve(Err(Error::Callback(panic_message(payload))));
            }
        });
        let emitter = Emitter {
            deliver,
            shared: shared.clone(),
        };
        debug!("subscription started");
        (self.subscribe_fn)(emitter);
        CompletionHandle { shared }
    }

    /// Draining convenience: subscribe with a no-op handler, await
    /// completion, and surface the first propagated error.
    pub async fn drain(self) -> Result<()> {
        self.subscribe(|_| {}).wait().await
    }
}

// ============================================================================
// CompletionHandle
// ============================================================================

/// Handle to an active subscription: cancellable, awaitable.
///
/// Clones share the same subscription.
#[derive(Clone)]
pub struct CompletionHandle {
    shared: Arc<SubShared>,
}

impl CompletionHandle {
    /// Cancel the subscription.
    ///
    /// Idempotent and safe under concurrent invocation. Once the
    /// cancellation is observed no further items reach the handler; one
    /// already-in-flight callback may still land. [`CompletionHandle::wait`]
    /// then resolves with [`Error::Canceled`].
    pub fn cancel(&self) {
        if self.shared.resolve(Err(Error::Canceled)) {
            debug!("subscription canceled");
        }
    }

    /// Whether the subscription has completed, errored, or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// Whether two handles refer to the same subscription.
    pub(crate) fn same_subscription(&self, other: &CompletionHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Await resolution: `Ok(())` on completion, the propagated error after
    /// a failure, [`Error::Canceled`] after cancellation.
    pub async fn wait(&self) -> Result<()> {
        resolved(self.shared.done_rx()).await;
        lock_unpoisoned(&self.shared.outcome)
            .clone()
            .unwrap_or(Ok(()))
    }
}
