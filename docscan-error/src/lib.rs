//! # docscan-error
//!
//! Unified error handling for docscan, in the OpenDAL style.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what went wrong (e.g., SourceUnavailable, EvaluatorTimeout)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Key-value pairs that locate the failing page or query
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use docscan_error::{Error, ErrorKind};
//!
//! fn fetch() -> Result<Vec<String>, Error> {
//!     Err(Error::new(ErrorKind::SourceUnavailable, "document index offline")
//!         .with_operation("source::fetch")
//!         .with_context("query", "What day is pizza day?"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All fallible operations return `Result<T, docscan_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, later layers only append context

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the docscan Error
pub type Result<T> = std::result::Result<T, Error>;
