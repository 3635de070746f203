//! Terminal operations.
//!
//! Every terminal consumes the sequence through the push protocol on the
//! caller's thread. The short-circuiting ones (`any`, `all`, `none`,
//! `find_first`) answer [`Step::Stop`] from their sink the moment the
//! outcome is decided; the stop unwinds the operator chain and is absorbed
//! right here, never escaping the terminal boundary.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;

use super::{Sequence, Step};

impl<T: Send + 'static> Sequence<T> {
    /// Collect every element into a `Vec`, preserving order.
    pub fn to_vec(self) -> Vec<T> {
        let mut items = Vec::new();
        self.traverse(|item| {
            items.push(item);
            Step::Continue
        });
        items
    }

    /// Collect every element into a `HashSet`.
    pub fn to_set(self) -> HashSet<T>
    where
        T: Eq + Hash,
    {
        let mut items = HashSet::new();
        self.traverse(|item| {
            items.insert(item);
            Step::Continue
        });
        items
    }

    /// Count the elements; always fully traverses.
    pub fn count(self) -> usize {
        let mut n = 0;
        self.traverse(|_| {
            n += 1;
            Step::Continue
        });
        n
    }

    /// Reduce with an identity value.
    pub fn fold<A, F>(self, init: A, mut f: F) -> A
    where
        F: FnMut(A, T) -> A,
    {
        let mut acc = Some(init);
        self.traverse(|item| {
            let current = acc.take().expect("fold accumulator present");
            acc = Some(f(current, item));
            Step::Continue
        });
        acc.expect("fold accumulator present")
    }

    /// Reduce without an identity value; `None` on an empty sequence.
    pub fn reduce<F>(self, mut f: F) -> Option<T>
    where
        F: FnMut(T, T) -> T,
    {
        let mut acc: Option<T> = None;
        self.traverse(|item| {
            acc = Some(match acc.take() {
                Some(current) => f(current, item),
                None => item,
            });
            Step::Continue
        });
        acc
    }

    /// Minimum by natural order; `None` on an empty sequence.
    pub fn min(self) -> Option<T>
    where
        T: Ord,
    {
        self.min_by(T::cmp)
    }

    /// Maximum by natural order; `None` on an empty sequence.
    pub fn max(self) -> Option<T>
    where
        T: Ord,
    {
        self.max_by(T::cmp)
    }

    /// Minimum by a comparator; the earliest of equal elements wins.
    pub fn min_by<F>(self, mut cmp: F) -> Option<T>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.reduce(|best, item| {
            if cmp(&item, &best) == Ordering::Less {
                item
            } else {
                best
            }
        })
    }

    /// Maximum by a comparator; the earliest of equal elements wins.
    pub fn max_by<F>(self, mut cmp: F) -> Option<T>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.reduce(|best, item| {
            if cmp(&item, &best) == Ordering::Greater {
                item
            } else {
                best
            }
        })
    }

    /// True if any element matches; short-circuits on the first match.
    pub fn any<P>(self, mut predicate: P) -> bool
    where
        P: FnMut(&T) -> bool,
    {
        let mut found = false;
        self.traverse(|item| {
            if predicate(&item) {
                found = true;
                Step::Stop
            } else {
                Step::Continue
            }
        });
        found
    }

    /// True if every element matches; short-circuits on the first failure.
    pub fn all<P>(self, mut predicate: P) -> bool
    where
        P: FnMut(&T) -> bool,
    {
        let mut ok = true;
        self.traverse(|item| {
            if predicate(&item) {
                Step::Continue
            } else {
                ok = false;
                Step::Stop
            }
        });
        ok
    }

    /// True if no element matches; short-circuits on the first match.
    pub fn none<P>(self, predicate: P) -> bool
    where
        P: FnMut(&T) -> bool,
    {
        !self.any(predicate)
    }

    /// The first element, if any; consumes at most one element upstream.
    pub fn find_first(self) -> Option<T> {
        let mut found = None;
        self.traverse(|item| {
            found = Some(item);
            Step::Stop
        });
        found
    }

    /// Run `f` once per element; always fully traverses.
    pub fn for_each<F>(self, mut f: F)
    where
        F: FnMut(T),
    {
        self.traverse(|item| {
            f(item);
            Step::Continue
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_vec_and_count() {
        assert_eq!(Sequence::of([3, 1, 2]).to_vec(), vec![3, 1, 2]);
        assert_eq!(Sequence::of([3, 1, 2]).count(), 3);
        assert_eq!(Sequence::<i32>::empty().count(), 0);
    }

    #[test]
    fn to_set_deduplicates() {
        let set = Sequence::of([1, 2, 2, 3]).to_set();
        assert_eq!(set.len(), 3);
        assert!(set.contains(&2));
    }

    #[test]
    fn fold_and_reduce() {
        assert_eq!(Sequence::of([1, 2, 3, 4]).fold(0, |acc, n| acc + n), 10);
        assert_eq!(Sequence::of([1, 2, 3, 4]).reduce(|a, b| a + b), Some(10));
        assert_eq!(Sequence::<i32>::empty().reduce(|a, b| a + b), None);
        assert_eq!(Sequence::<i32>::empty().fold(7, |acc, n| acc + n), 7);
    }

    #[test]
    fn min_max() {
        assert_eq!(Sequence::of([3, 1, 2]).min(), Some(1));
        assert_eq!(Sequence::of([3, 1, 2]).max(), Some(3));
        assert_eq!(Sequence::<i32>::empty().min(), None);
        assert_eq!(
            Sequence::of(["aa", "b", "ccc"]).min_by(|a, b| a.len().cmp(&b.len())),
            Some("b")
        );
    }

    #[test]
    fn matching_short_circuits() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let consumed = Arc::new(AtomicUsize::new(0));
        let counter = consumed.clone();
        let hit = Sequence::iterate(0, |n| n + 1)
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .any(|n| *n == 5);
        assert!(hit);
        // Short-circuit: stopped right after the match on an infinite source.
        assert_eq!(consumed.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn all_and_none() {
        assert!(Sequence::of([2, 4, 6]).all(|n| n % 2 == 0));
        assert!(!Sequence::of([2, 3]).all(|n| n % 2 == 0));
        assert!(Sequence::of([1, 3]).none(|n| n % 2 == 0));
        assert!(Sequence::<i32>::empty().all(|_| false));
        assert!(Sequence::<i32>::empty().none(|_| true));
    }

    #[test]
    fn find_first_takes_one() {
        assert_eq!(Sequence::iterate(9, |n| n + 1).find_first(), Some(9));
        assert_eq!(Sequence::<i32>::empty().find_first(), None);
    }

    #[test]
    fn for_each_visits_all() {
        let mut sum = 0;
        Sequence::of([1, 2, 3]).for_each(|n| sum += n);
        assert_eq!(sum, 6);
    }
}
