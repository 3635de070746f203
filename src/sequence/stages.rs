//! The closed operator set.
//!
//! One struct per operator, each owning exactly its private state (counters,
//! latches, the dedup set, the sort buffer) and implementing the push
//! capability only; the pull side derives generically in [`super::cursor`].
//!
//! Short-circuit containment rule: a stage that stops by itself (limit quota
//! reached, take-while predicate failed, zip's shorter side exhausted)
//! answers `Stop` to its *upstream* but reports `Continue` from its own
//! traversal, so downstream sees ordinary exhaustion. Only a stop requested
//! by the downstream sink propagates out as `Stop`. This keeps a `limit`
//! inside a `flat_map` inner sequence from terminating the outer traversal.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;

use super::{Sequence, Step, Traverse};

// ============================================================================
// Leaf Stages
// ============================================================================

/// Source over any host iterator.
pub(crate) struct IterSource<I> {
    iter: I,
}

impl<I> IterSource<I> {
    pub(crate) fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<T, I> Traverse<T> for IterSource<I>
where
    T: Send,
    I: Iterator<Item = T> + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        for item in &mut self.iter {
            if sink(item).is_stop() {
                return Step::Stop;
            }
        }
        Step::Continue
    }
}

/// The empty stage: stateless, safe to construct anywhere.
pub(crate) struct Empty;

impl<T: Send> Traverse<T> for Empty {
    fn traverse(&mut self, _sink: &mut dyn FnMut(T) -> Step) -> Step {
        Step::Continue
    }
}

/// Single-element source.
pub(crate) struct Once<T> {
    item: Option<T>,
}

impl<T> Once<T> {
    pub(crate) fn new(item: T) -> Self {
        Self { item: Some(item) }
    }
}

impl<T: Send> Traverse<T> for Once<T> {
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        if let Some(item) = self.item.take() {
            if sink(item).is_stop() {
                return Step::Stop;
            }
        }
        Step::Continue
    }
}

/// Infinite recurrence source: `seed, f(seed), f(f(seed)), ...`.
///
/// The successor is computed only after the current element was delivered,
/// so a short-circuit never runs `f` further than observed.
pub(crate) struct Recurrence<T, F> {
    seed: T,
    f: F,
}

impl<T, F> Recurrence<T, F> {
    pub(crate) fn new(seed: T, f: F) -> Self {
        Self { seed, f }
    }
}

impl<T, F> Traverse<T> for Recurrence<T, F>
where
    T: Clone + Send,
    F: FnMut(&T) -> T + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        loop {
            if sink(self.seed.clone()).is_stop() {
                return Step::Stop;
            }
            self.seed = (self.f)(&self.seed);
        }
    }
}

/// Infinite supplier source.
pub(crate) struct Supplier<F> {
    f: F,
}

impl<F> Supplier<F> {
    pub(crate) fn new(f: F) -> Self {
        Self { f }
    }
}

impl<T, F> Traverse<T> for Supplier<F>
where
    T: Send,
    F: FnMut() -> T + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        loop {
            if sink((self.f)()).is_stop() {
                return Step::Stop;
            }
        }
    }
}

// ============================================================================
// Stateless Rewrapping Stages
// ============================================================================

/// 1:1 transform.
pub(crate) struct Map<In, F> {
    upstream: Box<dyn Traverse<In>>,
    f: F,
}

impl<In, F> Map<In, F> {
    pub(crate) fn new(upstream: Box<dyn Traverse<In>>, f: F) -> Self {
        Self { upstream, f }
    }
}

impl<In, Out, F> Traverse<Out> for Map<In, F>
where
    In: Send,
    Out: Send,
    F: FnMut(In) -> Out + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(Out) -> Step) -> Step {
        let f = &mut self.f;
        self.upstream.traverse(&mut |item| sink(f(item)))
    }
}

/// Keep elements matching the predicate.
pub(crate) struct Filter<T, P> {
    upstream: Box<dyn Traverse<T>>,
    predicate: P,
}

impl<T, P> Filter<T, P> {
    pub(crate) fn new(upstream: Box<dyn Traverse<T>>, predicate: P) -> Self {
        Self {
            upstream,
            predicate,
        }
    }
}

impl<T, P> Traverse<T> for Filter<T, P>
where
    T: Send,
    P: FnMut(&T) -> bool + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        let predicate = &mut self.predicate;
        self.upstream.traverse(&mut |item| {
            if predicate(&item) {
                sink(item)
            } else {
                Step::Continue
            }
        })
    }
}

/// Filter and map in one step.
pub(crate) struct FilterMap<In, F> {
    upstream: Box<dyn Traverse<In>>,
    f: F,
}

impl<In, F> FilterMap<In, F> {
    pub(crate) fn new(upstream: Box<dyn Traverse<In>>, f: F) -> Self {
        Self { upstream, f }
    }
}

impl<In, Out, F> Traverse<Out> for FilterMap<In, F>
where
    In: Send,
    Out: Send,
    F: FnMut(In) -> Option<Out> + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(Out) -> Step) -> Step {
        let f = &mut self.f;
        self.upstream.traverse(&mut |item| match f(item) {
            Some(out) => sink(out),
            None => Step::Continue,
        })
    }
}

/// Side effect per element, before downstream delivery.
pub(crate) struct Inspect<T, F> {
    upstream: Box<dyn Traverse<T>>,
    action: F,
}

impl<T, F> Inspect<T, F> {
    pub(crate) fn new(upstream: Box<dyn Traverse<T>>, action: F) -> Self {
        Self { upstream, action }
    }
}

impl<T, F> Traverse<T> for Inspect<T, F>
where
    T: Send,
    F: FnMut(&T) + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        let action = &mut self.action;
        self.upstream.traverse(&mut |item| {
            action(&item);
            sink(item)
        })
    }
}

// ============================================================================
// Counting Stages
// ============================================================================

/// Drop the first `n` elements.
pub(crate) struct Skip<T> {
    upstream: Box<dyn Traverse<T>>,
    remaining: usize,
}

impl<T> Skip<T> {
    pub(crate) fn new(upstream: Box<dyn Traverse<T>>, n: usize) -> Self {
        Self {
            upstream,
            remaining: n,
        }
    }
}

impl<T: Send> Traverse<T> for Skip<T> {
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        let remaining = &mut self.remaining;
        self.upstream.traverse(&mut |item| {
            if *remaining > 0 {
                *remaining -= 1;
                Step::Continue
            } else {
                sink(item)
            }
        })
    }
}

/// Cap the stream to its first `n` elements; short-circuits upstream once
/// the quota is consumed.
pub(crate) struct Limit<T> {
    upstream: Box<dyn Traverse<T>>,
    remaining: usize,
}

impl<T> Limit<T> {
    pub(crate) fn new(upstream: Box<dyn Traverse<T>>, n: usize) -> Self {
        Self {
            upstream,
            remaining: n,
        }
    }
}

impl<T: Send> Traverse<T> for Limit<T> {
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        if self.remaining == 0 {
            return Step::Continue;
        }
        let remaining = &mut self.remaining;
        let mut downstream_stopped = false;
        self.upstream.traverse(&mut |item| {
            *remaining -= 1;
            if sink(item).is_stop() {
                downstream_stopped = true;
                return Step::Stop;
            }
            if *remaining == 0 {
                // Quota exhausted: stop upstream, plain exhaustion downstream.
                return Step::Stop;
            }
            Step::Continue
        });
        if downstream_stopped {
            Step::Stop
        } else {
            Step::Continue
        }
    }
}

// ============================================================================
// Latching Stages
// ============================================================================

/// Pass elements while the predicate holds; short-circuit upstream the
/// instant it first fails.
pub(crate) struct TakeWhile<T, P> {
    upstream: Box<dyn Traverse<T>>,
    predicate: P,
    done: bool,
}

impl<T, P> TakeWhile<T, P> {
    pub(crate) fn new(upstream: Box<dyn Traverse<T>>, predicate: P) -> Self {
        Self {
            upstream,
            predicate,
            done: false,
        }
    }
}

impl<T, P> Traverse<T> for TakeWhile<T, P>
where
    T: Send,
    P: FnMut(&T) -> bool + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        if self.done {
            return Step::Continue;
        }
        let predicate = &mut self.predicate;
        let done = &mut self.done;
        let mut downstream_stopped = false;
        self.upstream.traverse(&mut |item| {
            if !predicate(&item) {
                *done = true;
                return Step::Stop;
            }
            if sink(item).is_stop() {
                downstream_stopped = true;
                return Step::Stop;
            }
            Step::Continue
        });
        if downstream_stopped {
            Step::Stop
        } else {
            Step::Continue
        }
    }
}

/// Suppress leading elements while the predicate holds; a one-way latch that
/// never re-arms.
pub(crate) struct DropWhile<T, P> {
    upstream: Box<dyn Traverse<T>>,
    predicate: P,
    dropping: bool,
}

impl<T, P> DropWhile<T, P> {
    pub(crate) fn new(upstream: Box<dyn Traverse<T>>, predicate: P) -> Self {
        Self {
            upstream,
            predicate,
            dropping: true,
        }
    }
}

impl<T, P> Traverse<T> for DropWhile<T, P>
where
    T: Send,
    P: FnMut(&T) -> bool + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        let predicate = &mut self.predicate;
        let dropping = &mut self.dropping;
        self.upstream.traverse(&mut |item| {
            if *dropping {
                if predicate(&item) {
                    return Step::Continue;
                }
                *dropping = false;
            }
            sink(item)
        })
    }
}

// ============================================================================
// Stateful Set/Buffer Stages
// ============================================================================

/// First-occurrence-wins dedup via test-and-insert membership.
pub(crate) struct Distinct<T> {
    upstream: Box<dyn Traverse<T>>,
    seen: HashSet<T>,
}

impl<T> Distinct<T> {
    pub(crate) fn new(upstream: Box<dyn Traverse<T>>) -> Self {
        Self {
            upstream,
            seen: HashSet::new(),
        }
    }
}

impl<T> Traverse<T> for Distinct<T>
where
    T: Clone + Eq + Hash + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        let seen = &mut self.seen;
        self.upstream.traverse(&mut |item| {
            if seen.insert(item.clone()) {
                sink(item)
            } else {
                Step::Continue
            }
        })
    }
}

/// Full materialization and a single sort; the buffer replays across
/// interrupted and resumed consumption without re-sorting.
pub(crate) struct Sorted<T, F> {
    upstream: Option<Box<dyn Traverse<T>>>,
    cmp: F,
    buffer: Option<std::vec::IntoIter<T>>,
}

impl<T, F> Sorted<T, F> {
    pub(crate) fn new(upstream: Box<dyn Traverse<T>>, cmp: F) -> Self {
        Self {
            upstream: Some(upstream),
            cmp,
            buffer: None,
        }
    }
}

impl<T, F> Traverse<T> for Sorted<T, F>
where
    T: Send,
    F: FnMut(&T, &T) -> Ordering + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        if self.buffer.is_none() {
            let mut items = Vec::new();
            if let Some(mut upstream) = self.upstream.take() {
                upstream.traverse(&mut |item| {
                    items.push(item);
                    Step::Continue
                });
            }
            let cmp = &mut self.cmp;
            items.sort_by(|a, b| cmp(a, b));
            self.buffer = Some(items.into_iter());
        }
        if let Some(buffer) = self.buffer.as_mut() {
            for item in buffer {
                if sink(item).is_stop() {
                    return Step::Stop;
                }
            }
        }
        Step::Continue
    }
}

// ============================================================================
// Combining Stages
// ============================================================================

/// Concatenate the per-element sub-sequences produced by `f`.
pub(crate) struct FlatMap<In, F> {
    upstream: Box<dyn Traverse<In>>,
    f: F,
}

impl<In, F> FlatMap<In, F> {
    pub(crate) fn new(upstream: Box<dyn Traverse<In>>, f: F) -> Self {
        Self { upstream, f }
    }
}

impl<In, Out, F> Traverse<Out> for FlatMap<In, F>
where
    In: Send,
    Out: Send + 'static,
    F: FnMut(In) -> Sequence<Out> + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(Out) -> Step) -> Step {
        let f = &mut self.f;
        let mut downstream_stopped = false;
        self.upstream.traverse(&mut |item| {
            let inner = f(item);
            // An inner short-circuit (its own limit, say) only ends that
            // inner; the outer traversal stops solely on downstream request.
            inner.traverse(|out| {
                let step = sink(out);
                if step.is_stop() {
                    downstream_stopped = true;
                }
                step
            });
            if downstream_stopped {
                Step::Stop
            } else {
                Step::Continue
            }
        });
        if downstream_stopped {
            Step::Stop
        } else {
            Step::Continue
        }
    }
}

/// Pairwise combine; stops at the shorter source, pulling the right-hand
/// side one step per delivered element.
pub(crate) struct Zip<A, B: Send + 'static, F> {
    upstream: Box<dyn Traverse<A>>,
    other: Sequence<B>,
    f: F,
}

impl<A, B: Send + 'static, F> Zip<A, B, F> {
    pub(crate) fn new(upstream: Box<dyn Traverse<A>>, other: Sequence<B>, f: F) -> Self {
        Self { upstream, other, f }
    }
}

impl<A, B, Out, F> Traverse<Out> for Zip<A, B, F>
where
    A: Send,
    B: Send + 'static,
    Out: Send,
    F: FnMut(A, B) -> Out + Send,
{
    fn traverse(&mut self, sink: &mut dyn FnMut(Out) -> Step) -> Step {
        let other = &mut self.other;
        let f = &mut self.f;
        let mut downstream_stopped = false;
        self.upstream.traverse(&mut |a| {
            if !other.has_next() {
                // Shorter right side: plain exhaustion, not a short-circuit.
                return Step::Stop;
            }
            let b = other.next();
            let step = sink(f(a, b));
            if step.is_stop() {
                downstream_stopped = true;
            }
            step
        });
        if downstream_stopped {
            Step::Stop
        } else {
            Step::Continue
        }
    }
}

/// Yield all of `first`, then all of `second`.
pub(crate) struct Chain<T> {
    first: Box<dyn Traverse<T>>,
    second: Box<dyn Traverse<T>>,
}

impl<T> Chain<T> {
    pub(crate) fn new(first: Box<dyn Traverse<T>>, second: Box<dyn Traverse<T>>) -> Self {
        Self { first, second }
    }
}

impl<T: Send> Traverse<T> for Chain<T> {
    fn traverse(&mut self, sink: &mut dyn FnMut(T) -> Step) -> Step {
        if self.first.traverse(sink).is_stop() {
            return Step::Stop;
        }
        self.second.traverse(sink)
    }
}
