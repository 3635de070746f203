//! Push-to-pull suspension adapter.
//!
//! Engine stages implement push only; this module derives the pull side
//! once, generically, for all of them. The suspension primitive is a
//! dedicated producer thread running the push traversal, handing elements
//! to the puller over a kanal rendezvous channel (`bounded(0)`): a bounded
//! single-slot producer/consumer handoff.
//!
//! Resource cost per active pull cursor: one OS thread plus at most one
//! in-flight element; O(1) memory however long the stream. Push-driven
//! terminal operations never pay this cost, they traverse on the caller's
//! thread.
//!
//! Dropping the cursor closes the channel; the producer's next send fails,
//! which it answers with [`Step::Stop`], unwinding the traversal and ending
//! the thread. A panic inside a user callback on the producer side is
//! carried across the handoff and resumed on the puller's thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use kanal::{bounded, Receiver};
use tracing::trace;

use super::{Step, Traverse};

/// Messages crossing the handoff.
enum Envelope<T> {
    Item(T),
    /// A user callback panicked on the producer; the payload resumes on the
    /// puller's thread.
    Panicked(Box<dyn Any + Send>),
}

/// An active pull cursor over a push stage.
pub(crate) struct Handoff<T> {
    rx: Receiver<Envelope<T>>,
    peeked: Option<T>,
    producer: Option<JoinHandle<()>>,
    exhausted: bool,
}

impl<T: Send + 'static> Handoff<T> {
    /// Move the stage onto a producer thread connected by a rendezvous
    /// channel, lazily: the first element is only computed once the puller
    /// asks for it, and the producer never runs more than one element ahead.
    pub(crate) fn spawn(mut stage: Box<dyn Traverse<T>>) -> Self {
        let (tx, rx) = bounded::<Envelope<T>>(0);
        let producer = thread::Builder::new()
            .name("rill-pull".into())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    stage.traverse(&mut |item| {
                        if tx.send(Envelope::Item(item)).is_ok() {
                            Step::Continue
                        } else {
                            Step::Stop
                        }
                    });
                }));
                if let Err(payload) = outcome {
                    // Best effort: the puller may already be gone.
                    let _ = tx.send(Envelope::Panicked(payload));
                }
            })
            .expect("failed to spawn pull producer thread");
        trace!("pull cursor started");
        Self {
            rx,
            peeked: None,
            producer: Some(producer),
            exhausted: false,
        }
    }

    fn fetch(&mut self) -> Option<T> {
        if let Some(item) = self.peeked.take() {
            return Some(item);
        }
        if self.exhausted {
            return None;
        }
        match self.rx.recv() {
            Ok(Envelope::Item(item)) => Some(item),
            Ok(Envelope::Panicked(payload)) => {
                self.exhausted = true;
                self.join_producer();
                panic::resume_unwind(payload);
            }
            Err(_) => {
                self.exhausted = true;
                self.join_producer();
                None
            }
        }
    }

    /// Idempotent peek: holds at most one element in the slot.
    pub(crate) fn peek(&mut self) -> bool {
        if self.peeked.is_none() {
            self.peeked = self.fetch();
        }
        self.peeked.is_some()
    }

    /// Take the next element, `None` past exhaustion.
    pub(crate) fn next(&mut self) -> Option<T> {
        self.fetch()
    }

    fn join_producer(&mut self) {
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
    }
}

/// A partially pulled sequence still offers its push capability: draining
/// the handoff yields exactly the remainder, in order.
impl<T: Send + 'static> Traverse<T> for Handoff<T> {
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        while let Some(item) = self.fetch() {
            if sink(item).is_stop() {
                return Step::Stop;
            }
        }
        Step::Continue
    }
}

impl<T> Drop for Handoff<T> {
    fn drop(&mut self) {
        // Closing the channel fails the producer's pending send, which
        // unwinds its traversal; joining is then bounded.
        self.rx.close();
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
            trace!("pull cursor torn down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Sequence, Step};

    #[test]
    fn pull_matches_push_over_same_chain() {
        let build = || {
            Sequence::from_iter(0..20)
                .filter(|n| n % 2 == 0)
                .map(|n| n * 3)
        };

        let mut pushed = Vec::new();
        build().traverse(|n| {
            pushed.push(n);
            Step::Continue
        });

        let mut pulled = Vec::new();
        let mut seq = build();
        while seq.has_next() {
            pulled.push(seq.next());
        }

        assert_eq!(pushed, pulled);
    }

    #[test]
    fn dropping_a_cursor_unwinds_an_infinite_producer() {
        let mut seq = Sequence::generate(|| 42u32);
        assert!(seq.has_next());
        assert_eq!(seq.next(), 42);
        // Dropping while infinitely many elements remain must not hang.
        drop(seq);
    }

    #[test]
    fn pull_over_infinite_source_is_incremental() {
        let mut seq = Sequence::iterate(0u64, |n| n + 1);
        for expected in 0..100 {
            assert!(seq.has_next());
            assert_eq!(seq.next(), expected);
        }
    }

    #[test]
    fn callback_panic_resumes_on_the_puller() {
        let mut seq = Sequence::of([1, 2, 3]).map(|n| {
            if n == 2 {
                panic!("boom in map");
            }
            n
        });
        assert_eq!(seq.next(), 1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| seq.next()));
        assert!(result.is_err());
    }
}
