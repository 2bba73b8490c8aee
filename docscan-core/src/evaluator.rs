//! # Page Evaluators
//!
//! An evaluator looks at one page and the user's query and returns a
//! [`Verdict`]: whether the page is relevant and, if so, a short note with
//! the facts it contributes. It never answers the question itself.
//!
//! - [`KeywordEvaluator`]: deterministic term matching, no network
//! - [`FnEvaluator`]: wraps a closure, handy for tests and glue code

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Relevance decision for one page
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Verdict {
    pub relevant: bool,
    #[serde(default, alias = "summary", skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Verdict {
    pub fn relevant(note: impl Into<String>) -> Self {
        Self {
            relevant: true,
            note: Some(note.into()),
        }
    }

    pub fn irrelevant() -> Self {
        Self::default()
    }

    /// The note to record, if any.
    ///
    /// Irrelevant verdicts and blank notes yield nothing.
    pub fn into_note(self) -> Option<String> {
        if !self.relevant {
            return None;
        }
        self.note
            .map(|note| note.trim().to_string())
            .filter(|note| !note.is_empty())
    }
}

/// Decides relevance of a single page
#[allow(async_fn_in_trait)]
pub trait PageEvaluator {
    /// Judge `page` against `query`.
    ///
    /// Errors are retried by the controller according to their status.
    async fn evaluate(&self, query: &str, page: &str) -> Result<Verdict>;
}

// ============================================================================
// Closure evaluator
// ============================================================================

/// Evaluator backed by a synchronous closure
pub struct FnEvaluator<F> {
    f: F,
}

/// Build an evaluator from a closure
pub fn from_fn<F>(f: F) -> FnEvaluator<F>
where
    F: Fn(&str, &str) -> Result<Verdict>,
{
    FnEvaluator { f }
}

impl<F> PageEvaluator for FnEvaluator<F>
where
    F: Fn(&str, &str) -> Result<Verdict>,
{
    async fn evaluate(&self, query: &str, page: &str) -> Result<Verdict> {
        (self.f)(query, page)
    }
}

// ============================================================================
// Keyword evaluator
// ============================================================================

/// Words that carry no topic on their own
const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "any", "are", "as", "at", "be", "by", "can", "could", "did", "do",
    "does", "for", "from", "has", "have", "how", "i", "in", "is", "it", "its", "me", "my", "of",
    "on", "or", "our", "please", "should", "tell", "that", "the", "there", "this", "to", "us",
    "was", "we", "were", "what", "when", "where", "which", "who", "why", "will", "with", "work",
    "works", "you",
];

/// Judges a page relevant when it mentions enough query terms.
///
/// The note is the page's title line followed by every line that mentions a
/// term, so later pages can be compared against earlier ones.
#[derive(Debug, Clone)]
pub struct KeywordEvaluator {
    min_matches: usize,
}

impl Default for KeywordEvaluator {
    fn default() -> Self {
        Self { min_matches: 1 }
    }
}

impl KeywordEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require at least `min_matches` distinct query terms on a page
    pub fn with_min_matches(mut self, min_matches: usize) -> Self {
        self.min_matches = min_matches.max(1);
        self
    }

    /// Distinct, lowercased topic terms of a query
    pub fn terms(query: &str) -> BTreeSet<String> {
        tokens(query)
            .filter(|token| !STOP_WORDS.contains(&token.as_str()))
            .collect()
    }

    fn judge(&self, query: &str, page: &str) -> Verdict {
        let terms = Self::terms(query);
        if terms.is_empty() {
            return Verdict::irrelevant();
        }

        let page_tokens: BTreeSet<String> = tokens(page).collect();
        let matched = terms.iter().filter(|t| page_tokens.contains(*t)).count();
        if matched < self.min_matches {
            return Verdict::irrelevant();
        }

        let mut lines = page.lines().map(str::trim).filter(|line| !line.is_empty());
        let title = lines.next().unwrap_or_default();
        let mut parts = vec![title.trim_end_matches('.').to_string()];
        parts.extend(
            lines
                .filter(|line| tokens(line).any(|token| terms.contains(&token)))
                .map(str::to_string),
        );
        Verdict::relevant(parts.join(" | "))
    }
}

impl PageEvaluator for KeywordEvaluator {
    async fn evaluate(&self, query: &str, page: &str) -> Result<Verdict> {
        Ok(self.judge(query, page))
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}
