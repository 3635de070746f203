//! Error types for rill.

use thiserror::Error;

/// Result type alias using rill's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rill operations.
///
/// Errors are cheap to clone: an asynchronous subscription surfaces the same
/// error through the error callback slot and the completion handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A constructor argument was rejected up front.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The subscription was cancelled before completion.
    #[error("subscription canceled")]
    Canceled,

    /// A user callback panicked on a worker task.
    #[error("callback panicked: {0}")]
    Callback(String),

    /// An asynchronous source failed to produce its value.
    #[error("source error: {0}")]
    Source(String),
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
