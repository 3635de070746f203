//! Extension point for custom push-only stages.
//!
//! Callers can inject a stage that only knows how to push. The engine
//! supplies the pull side automatically by materializing the stage's push
//! output into a buffer once and replaying from it. This is the only place
//! where pull costs O(n) memory instead of O(1); the bridge runs at most
//! once per sequence instance, and push-driven consumption never buffers.

use tracing::debug;

use super::{Sequence, Step, Traverse};

/// Run a push-only stage to exhaustion, buffering its output for replay.
pub(crate) fn materialize<T>(mut stage: Box<dyn Traverse<T>>) -> std::vec::IntoIter<T> {
    let mut items = Vec::new();
    stage.traverse(&mut |item| {
        items.push(item);
        Step::Continue
    });
    debug!(buffered = items.len(), "bridged push-only stage for pull");
    items.into_iter()
}

impl<T: Send + 'static> Sequence<T> {
    /// Inject a custom push-only stage.
    ///
    /// `build` receives the upstream sequence and returns a new push
    /// capability over it. The resulting sequence pushes natively; its pull
    /// side goes through the buffering bridge described in the module docs,
    /// so pulling it materializes the stage's full output once. Do not pull
    /// an extension over an infinite upstream.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rill::sequence::{Sequence, Step, Traverse};
    ///
    /// /// Emits a running sum instead of the raw elements.
    /// struct RunningSum {
    ///     upstream: Box<dyn Traverse<i64>>,
    /// }
    ///
    /// impl Traverse<i64> for RunningSum {
    ///     fn traverse(&mut self, sink: &mut dyn FnMut(i64) -> Step) -> Step {
    ///         let mut total = 0;
    ///         self.upstream.traverse(&mut |n| {
    ///             total += n;
    ///             sink(total)
    ///         })
    ///     }
    /// }
    ///
    /// let sums = Sequence::of([1i64, 2, 3])
    ///     .extend_push(|up| Box::new(RunningSum { upstream: up.into_stage_boxed() }))
    ///     .to_vec();
    /// assert_eq!(sums, vec![1, 3, 6]);
    /// ```
    pub fn extend_push<U, F>(self, build: F) -> Sequence<U>
    where
        U: Send + 'static,
        F: FnOnce(Sequence<T>) -> Box<dyn Traverse<U>>,
    {
        Sequence::bridged(build(self))
    }

    /// Recover the boxed push capability of this sequence.
    ///
    /// Intended for [`Sequence::extend_push`] implementations that wrap the
    /// upstream directly; a partially pulled sequence yields its remainder.
    pub fn into_stage_boxed(self) -> Box<dyn Traverse<T>> {
        self.into_stage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A push-only stage that emits each element twice.
    struct Doubler {
        upstream: Box<dyn Traverse<i32>>,
        traversals: Arc<AtomicUsize>,
    }

    impl Traverse<i32> for Doubler {
        fn traverse(&mut self, sink: &mut dyn FnMut(i32) -> Step) -> Step {
            self.traversals.fetch_add(1, Ordering::SeqCst);
            self.upstream.traverse(&mut |n| {
                if sink(n).is_stop() {
                    return Step::Stop;
                }
                sink(n)
            })
        }
    }

    #[test]
    fn extension_stage_pushes_natively() {
        let traversals = Arc::new(AtomicUsize::new(0));
        let count = traversals.clone();
        let out = Sequence::of([1, 2])
            .extend_push(move |up| {
                Box::new(Doubler {
                    upstream: up.into_stage_boxed(),
                    traversals: count,
                })
            })
            .to_vec();
        assert_eq!(out, vec![1, 1, 2, 2]);
        assert_eq!(traversals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn extension_stage_pull_goes_through_the_bridge_once() {
        let traversals = Arc::new(AtomicUsize::new(0));
        let count = traversals.clone();
        let mut seq = Sequence::of([1, 2, 3]).extend_push(move |up| {
            Box::new(Doubler {
                upstream: up.into_stage_boxed(),
                traversals: count,
            })
        });

        let mut pulled = Vec::new();
        while seq.has_next() {
            pulled.push(seq.next());
        }
        assert_eq!(pulled, vec![1, 1, 2, 2, 3, 3]);
        // The buffering bridge ran the push traversal exactly once.
        assert_eq!(traversals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn operators_stack_on_top_of_an_extension() {
        let traversals = Arc::new(AtomicUsize::new(0));
        let count = traversals.clone();
        let out = Sequence::of([1, 2, 3])
            .extend_push(move |up| {
                Box::new(Doubler {
                    upstream: up.into_stage_boxed(),
                    traversals: count,
                })
            })
            .distinct()
            .map(|n| n * 10)
            .to_vec();
        assert_eq!(out, vec![10, 20, 30]);
    }
}
