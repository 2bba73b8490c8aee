//! The main Error type for docscan

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// Error returned by every docscan operation.
///
/// Besides its kind and message, an error records whether retrying may help
/// ([`ErrorStatus`]), the operation that raised it, and key/value context
/// such as the page index or attempt number.
///
/// ```rust
/// use docscan_error::{Error, ErrorKind};
///
/// let err = Error::evaluator_failed("model returned no verdict")
///     .temporary()
///     .with_operation("controller::evaluate_page")
///     .with_context("page_index", "3");
///
/// assert_eq!(err.kind(), ErrorKind::EvaluatorFailed);
/// assert!(err.is_retryable());
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Status defaults to what the kind implies; see [`ErrorKind::is_retryable`]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    pub fn temporary(self) -> Self {
        self.with_status(ErrorStatus::Temporary)
    }

    pub fn permanent(self) -> Self {
        self.with_status(ErrorStatus::Permanent)
    }

    /// Name the operation that failed.
    ///
    /// An operation set earlier moves into the context under `called`, so a
    /// wrapped error still shows where it started.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            let inner = std::mem::replace(&mut self.operation, operation);
            self.context.push(("called", inner.to_string()));
        } else {
            self.operation = operation;
        }
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attach the underlying cause; an error has at most one
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    /// Retries are spent: a temporary error becomes persistent
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

/// One line, as logged and stored in page failures:
/// `Kind (status) at operation: message [key: value, ...]`
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.status)?;
        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }

        let mut context = self.context.iter();
        if let Some((key, value)) = context.next() {
            write!(f, " [{}: {}", key, value)?;
            for (key, value) in context {
                write!(f, ", {}: {}", key, value)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Error");
        debug.field("kind", &self.kind).field("status", &self.status);
        if !self.operation.is_empty() {
            debug.field("operation", &self.operation);
        }
        debug.field("message", &self.message);
        if !self.context.is_empty() {
            debug.field("context", &self.context);
        }
        if let Some(source) = &self.source {
            debug.field("source", source);
        }
        debug.finish()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    /// Create an Unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create a ConfigInvalid error naming the offending field
    pub fn config_invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, reason).with_context("field", field)
    }

    /// Create a SourceUnavailable error
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::SourceUnavailable, reason)
    }

    /// Create an EvaluatorTimeout error
    pub fn evaluator_timeout(timeout_ms: u64) -> Self {
        Self::new(
            ErrorKind::EvaluatorTimeout,
            format!("page evaluation exceeded {}ms", timeout_ms),
        )
        .with_context("timeout_ms", timeout_ms.to_string())
    }

    /// Create an EvaluatorFailed error (permanent unless marked otherwise)
    pub fn evaluator_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::EvaluatorFailed, reason)
    }

    /// Create a SynthesisFailed error
    pub fn synthesis_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::SynthesisFailed, reason)
    }

    /// Create a ParseFailed error
    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }
}
