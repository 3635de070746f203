//! Integration tests for the synchronous sequence pipeline.

use rill::sequence::{Sequence, Step};

/// Collect a sequence through the push protocol.
fn collect_push<T: Send + 'static>(seq: Sequence<T>) -> Vec<T> {
    let mut out = Vec::new();
    seq.traverse(|item| {
        out.push(item);
        Step::Continue
    });
    out
}

/// Collect a sequence through the pull protocol.
fn collect_pull<T: Send + 'static>(mut seq: Sequence<T>) -> Vec<T> {
    let mut out = Vec::new();
    while seq.has_next() {
        out.push(seq.next());
    }
    out
}

/// Pull and push agree over an order-preserving operator chain.
#[test]
fn pull_equals_push_across_a_long_chain() {
    let build = || {
        Sequence::from_iter(0..200)
            .map(|n| n * 3)
            .filter(|n| n % 2 == 0)
            .skip(5)
            .inspect(|_| {})
            .map(|n| n + 1)
            .limit(40)
            .drop_while(|n| *n < 60)
    };

    assert_eq!(collect_push(build()), collect_pull(build()));
}

#[test]
fn pull_equals_push_for_stateful_stages() {
    let build = || {
        Sequence::of([5, 3, 5, 9, 1, 3, 7, 9, 2])
            .distinct()
            .sorted()
            .take_while(|n| *n < 9)
    };
    assert_eq!(collect_push(build()), vec![1, 2, 3, 5, 7]);
    assert_eq!(collect_push(build()), collect_pull(build()));
}

/// `limit(n)` over an infinite generator terminates with exactly n elements.
#[test]
fn limit_bounds_an_infinite_generator() {
    for n in [0usize, 1, 100] {
        let out = Sequence::iterate(0usize, |v| v + 1).limit(n).to_vec();
        assert_eq!(out.len(), n);
        assert_eq!(out, (0..n).collect::<Vec<_>>());
    }

    let mut calls = 0u32;
    let out = Sequence::generate(move || {
        calls += 1;
        calls
    })
    .limit(3)
    .to_vec();
    assert_eq!(out, vec![1, 2, 3]);
}

#[test]
fn distinct_keeps_first_occurrence_order() {
    let out = Sequence::of([
        "a", "x", "v", "d", "g", "x", "j", "x", "y", "r", "y", "w", "y", "a", "e",
    ])
    .distinct()
    .to_vec();
    assert_eq!(out, vec!["a", "x", "v", "d", "g", "j", "y", "r", "w", "e"]);
}

#[test]
fn flat_map_concatenates_in_order() {
    let out = Sequence::of([2, 5, 8])
        .flat_map(|n| Sequence::of([n - 1, n, n + 1]))
        .to_vec();
    assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[test]
fn zip_is_bounded_by_the_shorter_source() {
    let pairs = Sequence::from_iter(1..=9)
        .zip(Sequence::from_iter('a'..='g'), |n, c| (n, c))
        .to_vec();
    assert_eq!(pairs.len(), 7);
    assert_eq!(pairs.first(), Some(&(1, 'a')));
    assert_eq!(pairs.last(), Some(&(7, 'g')));
}

/// `drop_while` latches open permanently; `take_while` latches shut.
#[test]
fn drop_while_and_take_while_latch_opposite_ways() {
    let input = [1, 2, 9, 1, 2, 9, 1];

    let dropped = Sequence::of(input).drop_while(|n| *n < 5).to_vec();
    assert_eq!(dropped, vec![9, 1, 2, 9, 1]);

    let taken = Sequence::of(input).take_while(|n| *n < 5).to_vec();
    assert_eq!(taken, vec![1, 2]);
}

#[test]
fn exhausted_pull_sequence_stays_quietly_empty() {
    let mut seq = Sequence::of([1, 2]);
    assert_eq!(seq.next(), 1);
    assert_eq!(seq.next(), 2);
    assert!(!seq.has_next());
    assert!(!seq.has_next());
    assert_eq!(collect_push(seq), Vec::<i32>::new());
}

#[test]
#[should_panic(expected = "past exhaustion")]
fn next_without_has_next_past_the_end_is_fatal() {
    let mut seq = Sequence::<i32>::empty();
    seq.next();
}

/// Partial pull then push sees exactly the logical remainder.
#[test]
fn pull_prefix_then_push_remainder_round_trip() {
    let mut seq = Sequence::from_iter(0..10).map(|n| n * 2);
    assert!(seq.has_next());
    assert_eq!(seq.next(), 0);
    assert_eq!(seq.next(), 2);
    assert_eq!(seq.next(), 4);

    assert_eq!(collect_push(seq), vec![6, 8, 10, 12, 14, 16, 18]);
}

/// Short-circuiting terminals leave the operator chain quietly.
#[test]
fn terminal_short_circuits_stay_inside_the_terminal() {
    assert!(Sequence::iterate(0, |n| n + 1).any(|n| *n == 10));
    assert!(!Sequence::iterate(0, |n| n + 1).all(|n| *n < 10));
    assert_eq!(Sequence::iterate(5, |n| n + 1).find_first(), Some(5));
}

#[test]
fn chained_sequences_pull_across_the_seam() {
    let mut seq = Sequence::of([1, 2]).chain(Sequence::of([3, 4]));
    let mut out = Vec::new();
    while seq.has_next() {
        out.push(seq.next());
    }
    assert_eq!(out, vec![1, 2, 3, 4]);
}

#[test]
fn sorted_after_partial_pull_keeps_its_buffer() {
    let mut seq = Sequence::of([3, 1, 2]).sorted();
    assert_eq!(seq.next(), 1);
    assert_eq!(collect_push(seq), vec![2, 3]);
}

#[test]
fn operators_compose_over_a_partially_pulled_sequence() {
    let mut seq = Sequence::from_iter(0..8);
    assert_eq!(seq.next(), 0);
    assert_eq!(seq.next(), 1);

    // The remainder is an ordinary sequence again.
    let out = seq.map(|n| n * 10).to_vec();
    assert_eq!(out, vec![20, 30, 40, 50, 60, 70]);
}

#[test]
fn terminal_values_over_mixed_chains() {
    assert_eq!(
        Sequence::from_iter(1..=100).filter(|n| n % 10 == 0).count(),
        10
    );
    assert_eq!(Sequence::of([4, 7, 1]).sorted().find_first(), Some(1));
    assert_eq!(
        Sequence::of(["lorem", "ipsum", "dolor"])
            .map(str::len)
            .max(),
        Some(5)
    );
    assert_eq!(
        Sequence::from_iter(1..=4).fold(0, |acc, n| acc * 10 + n),
        1234
    );
}
