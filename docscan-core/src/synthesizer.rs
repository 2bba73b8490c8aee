//! Answer synthesis from accumulated notes

use crate::error::Result;

/// Answer given when the scan found nothing relevant
pub const NO_INFORMATION_ANSWER: &str =
    "No information relevant to your question was found in the scanned documents.";

/// Turns the notes of a finished scan into an answer
#[allow(async_fn_in_trait)]
pub trait AnswerSynthesizer {
    /// Answer `query` from `notes` (page order, oldest first).
    ///
    /// Empty notes must produce a "no information found" answer, and the
    /// answer must not contain facts absent from the notes.
    async fn synthesize(&self, query: &str, notes: &[String]) -> Result<String>;
}

/// Deterministic synthesizer that quotes the notes back.
///
/// Later pages supersede earlier ones, so the newest note leads and the
/// older notes follow newest first.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveSynthesizer;

impl ExtractiveSynthesizer {
    pub fn new() -> Self {
        Self
    }
}

impl AnswerSynthesizer for ExtractiveSynthesizer {
    async fn synthesize(&self, _query: &str, notes: &[String]) -> Result<String> {
        let Some((latest, earlier)) = notes.split_last() else {
            return Ok(NO_INFORMATION_ANSWER.to_string());
        };

        let mut answer = format!("Most recent finding: {}", latest);
        if !earlier.is_empty() {
            answer.push_str("\n\nEarlier notes (may be superseded by the finding above):");
            for note in earlier.iter().rev() {
                answer.push_str("\n- ");
                answer.push_str(note);
            }
        }
        Ok(answer)
    }
}
