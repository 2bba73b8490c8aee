//! Scan error types
//!
//! Re-exports docscan-error and provides scan-specific conveniences.

pub use docscan_error::{Error, ErrorKind, ErrorStatus, Result};

use std::time::Duration;

/// Context key carrying a delay the server asked for before the next attempt
pub const RETRY_AFTER_KEY: &str = "retry_after_ms";

/// Wrap a failed document fetch as `SourceUnavailable`.
///
/// An error that already carries that kind only gains the operation.
pub fn source_unavailable(err: Error) -> Error {
    if err.kind() == ErrorKind::SourceUnavailable {
        return err.with_operation("controller::initialize");
    }
    Error::source_unavailable(format!("document fetch failed: {}", err.message()))
        .with_operation("controller::initialize")
        .with_context("cause", err.kind().as_str())
        .set_source(err)
}

/// Create an EvaluatorTimeout error for one page
pub fn evaluator_timeout(timeout_ms: u64, page_index: usize) -> Error {
    Error::evaluator_timeout(timeout_ms).with_context("page_index", page_index.to_string())
}

/// Record a server-requested retry delay on `err`
pub fn with_retry_after(err: Error, delay: Duration) -> Error {
    err.with_context(RETRY_AFTER_KEY, delay.as_millis().to_string())
}

/// The retry delay recorded by [`with_retry_after`], if any
pub fn retry_after(err: &Error) -> Option<Duration> {
    err.context()
        .iter()
        .rev()
        .find(|(key, _)| *key == RETRY_AFTER_KEY)
        .and_then(|(_, value)| value.parse::<u64>().ok())
        .map(Duration::from_millis)
}
