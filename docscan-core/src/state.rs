//! # Scan State
//!
//! The explicit record a scan carries from one step to the next. It replaces
//! an ambient key-value session: the controller receives it by `&mut`, and it
//! is the only place progress lives.
//!
//! Invariants:
//! - `current_index < pages.len()`, or `current_index == pages.len()` exactly
//!   when `done` is set
//! - `notes` and `failures` are append-only

use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};

/// Where a scan is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// Created, no page evaluated yet
    Initialized,
    /// At least one page evaluated, pages remain
    Scanning,
    /// Every page has been visited
    Done,
}

/// A page whose evaluation could not be completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    /// Position of the page in the sequence
    pub index: usize,
    /// Error kind of the last attempt
    pub kind: String,
    /// Attempts spent on the page
    pub attempts: u32,
    /// Rendered error of the last attempt
    pub message: String,
}

impl PageFailure {
    pub fn new(index: usize, error: &Error, attempts: u32) -> Self {
        Self {
            index,
            kind: error.kind().as_str().to_string(),
            attempts,
            message: error.to_string(),
        }
    }

    /// Whether the last attempt ran out of time
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::EvaluatorTimeout.as_str()
    }
}

/// Mutable state of one scan session.
///
/// Deserialization checks the index invariants, so a restored state is
/// always safe to resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScanState")]
pub struct ScanState {
    query: String,
    pages: Vec<String>,
    current_index: usize,
    notes: Vec<String>,
    done: bool,
    failures: Vec<PageFailure>,
}

impl ScanState {
    /// Create the state for a fresh scan.
    ///
    /// An empty page sequence is already terminal.
    pub fn new(query: impl Into<String>, pages: Vec<String>) -> Self {
        let done = pages.is_empty();
        Self {
            query: query.into(),
            pages,
            current_index: 0,
            notes: Vec::new(),
            done,
            failures: Vec::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Notes in the order their pages were judged relevant
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Pages whose evaluation was abandoned
    pub fn failures(&self) -> &[PageFailure] {
        &self.failures
    }

    /// Text of the page the next step will evaluate
    pub fn current_page(&self) -> Option<&str> {
        if self.done {
            return None;
        }
        self.pages.get(self.current_index).map(String::as_str)
    }

    /// Pages not yet visited
    pub fn remaining(&self) -> usize {
        self.pages.len().saturating_sub(self.current_index)
    }

    pub fn phase(&self) -> ScanPhase {
        if self.done {
            ScanPhase::Done
        } else if self.current_index == 0 {
            ScanPhase::Initialized
        } else {
            ScanPhase::Scanning
        }
    }

    /// Notes rendered as a bullet list, one `- note` line each
    pub fn knowledge_base(&self) -> String {
        render_knowledge_base(&self.notes)
    }

    /// Consume the state, keeping only the notes
    pub fn into_notes(self) -> Vec<String> {
        self.notes
    }

    // =========================================================================
    // Mutations (controller only)
    // =========================================================================

    pub(crate) fn push_note(&mut self, note: String) {
        self.notes.push(note);
    }

    pub(crate) fn record_failure(&mut self, failure: PageFailure) {
        self.failures.push(failure);
    }

    /// Move past the current page; returns whether the scan is now done
    pub(crate) fn advance(&mut self) -> bool {
        debug_assert!(!self.done, "advance called on a finished scan");
        self.current_index += 1;
        if self.current_index >= self.pages.len() {
            self.done = true;
        }
        self.done
    }
}

/// Unchecked wire form of [`ScanState`]
#[derive(Deserialize)]
struct RawScanState {
    query: String,
    pages: Vec<String>,
    current_index: usize,
    #[serde(default)]
    notes: Vec<String>,
    done: bool,
    #[serde(default)]
    failures: Vec<PageFailure>,
}

impl TryFrom<RawScanState> for ScanState {
    type Error = Error;

    fn try_from(raw: RawScanState) -> Result<Self, Error> {
        let total = raw.pages.len();
        if raw.current_index > total {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("current_index {} is past the last of {} pages", raw.current_index, total),
            )
            .with_operation("state::restore"));
        }
        if raw.done != (raw.current_index == total) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!(
                    "done = {} does not match current_index {} of {} pages",
                    raw.done, raw.current_index, total
                ),
            )
            .with_operation("state::restore"));
        }
        if let Some(failure) = raw.failures.iter().find(|f| f.index >= raw.current_index) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("failure recorded for unvisited page {}", failure.index),
            )
            .with_operation("state::restore"));
        }

        Ok(Self {
            query: raw.query,
            pages: raw.pages,
            current_index: raw.current_index,
            notes: raw.notes,
            done: raw.done,
            failures: raw.failures,
        })
    }
}

/// Render notes as a bullet list
pub fn render_knowledge_base(notes: &[String]) -> String {
    notes
        .iter()
        .map(|note| format!("- {}", note))
        .collect::<Vec<_>>()
        .join("\n")
}
