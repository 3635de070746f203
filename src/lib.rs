//! # Rill
//!
//! A lazy, composable sequence-processing engine: operator pipelines (map,
//! filter, flat_map, distinct, zip, sorted, take_while, ...) evaluated
//! through two interchangeable traversal protocols, a caller-driven
//! step-by-step pull and a producer-driven bulk push, plus a reactive
//! asynchronous variant of the same abstraction with subscription,
//! cancellation, and concurrent fan-out/fan-in.
//!
//! ## Synchronous pipelines
//!
//! ```rust
//! use rill::prelude::*;
//!
//! let first_squares = Sequence::iterate(1u64, |n| n + 1)
//!     .map(|n| n * n)
//!     .limit(4)
//!     .to_vec();
//! assert_eq!(first_squares, vec![1, 4, 9, 16]);
//!
//! // The same chain, consumed step by step through the pull protocol.
//! let mut seq = Sequence::iterate(1u64, |n| n + 1).map(|n| n * n);
//! assert!(seq.has_next());
//! assert_eq!(seq.next(), 1);
//! assert_eq!(seq.next(), 4);
//! ```
//!
//! ## Reactive pipelines
//!
//! ```rust
//! use rill::prelude::*;
//! use std::sync::{Arc, Mutex};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let handle = AsyncSequence::of([2, 5, 8])
//!     .flat_map_concat(|n| AsyncSequence::of([n - 1, n, n + 1]))
//!     .subscribe(move |n| sink.lock().unwrap().push(n));
//! handle.wait().await.unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod reactive;
pub mod sequence;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::reactive::{AsyncSequence, CompletionHandle, ItemStream};
    pub use crate::sequence::{Sequence, Step, Traverse};
}

pub use error::{Error, Result};
