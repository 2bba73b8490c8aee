//! Agent implementation - setup, scan loop and synthesis as one pipeline

use docscan_core::{
    AnswerSynthesizer, CancelFlag, DocumentSource, Error, PageEvaluator, PageFailure, Result,
    RunOutcome, ScanConfig, ScanController,
};
use serde::Serialize;
use tracing::{info, warn};

/// Configuration for the agent
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    /// Limits for the scan loop
    pub scan: ScanConfig,
    /// Print progress to stdout
    pub verbose: bool,
}

/// Result of one `ask`
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub query: String,
    pub answer: String,
    /// Notes in page order, as handed to the synthesizer
    pub notes: Vec<String>,
    pub outcome: RunOutcome,
    /// True when the answer was written before every page was read
    pub truncated: bool,
    pub pages_total: usize,
    pub pages_scanned: usize,
    pub failures: Vec<PageFailure>,
}

/// The agent: one controller plus one synthesizer
pub struct DocAgent<S, E, Y> {
    controller: ScanController<S, E>,
    synthesizer: Y,
    config: AgentConfig,
    cancel: Option<CancelFlag>,
}

impl<S, E, Y> DocAgent<S, E, Y>
where
    S: DocumentSource,
    E: PageEvaluator,
    Y: AnswerSynthesizer,
{
    /// Create an agent with default configuration
    pub fn new(source: S, evaluator: E, synthesizer: Y) -> Self {
        Self::with_config(source, evaluator, synthesizer, AgentConfig::default())
    }

    pub fn with_config(source: S, evaluator: E, synthesizer: Y, config: AgentConfig) -> Self {
        Self {
            controller: ScanController::with_config(source, evaluator, config.scan.clone()),
            synthesizer,
            config,
            cancel: None,
        }
    }

    /// Stop scanning between pages once `cancel` is raised
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn controller(&self) -> &ScanController<S, E> {
        &self.controller
    }

    /// Answer `query` from the notes of a bounded scan.
    ///
    /// Only a failing document source or synthesizer is an error; pages the
    /// evaluator could not judge show up in `failures`.
    pub async fn ask(&self, query: &str) -> Result<AgentResult> {
        if self.config.verbose {
            println!("Question: {}\n", query);
        }

        let mut state = self.controller.initialize(query).await?;
        let pages_total = state.pages().len();
        info!(pages = pages_total, "scan initialized");
        if self.config.verbose {
            println!("Scanning {} pages...", pages_total);
        }

        let max_iterations = self.config.scan.max_iterations;
        let outcome = match &self.cancel {
            Some(cancel) => {
                self.controller
                    .run_with_cancel(&mut state, max_iterations, cancel)
                    .await
            }
            None => self.controller.run(&mut state, max_iterations).await,
        };

        let truncated = !outcome.is_complete();
        if truncated {
            warn!(
                outcome = outcome.label(),
                scanned = state.current_index(),
                total = pages_total,
                "answering from a partial scan"
            );
        }
        if self.config.verbose {
            println!(
                "   {} of {} pages scanned ({}), {} notes",
                state.current_index(),
                pages_total,
                outcome.label(),
                state.notes().len()
            );
            for failure in state.failures() {
                println!(
                    "   page {} skipped after {} attempts: {}",
                    failure.index, failure.attempts, failure.kind
                );
            }
            println!("\nWriting answer...");
        }

        let answer = self
            .synthesizer
            .synthesize(query, state.notes())
            .await
            .map_err(|e| synthesis_error(e).with_operation("agent::synthesize"))?;

        let pages_scanned = state.current_index();
        let failures = state.failures().to_vec();
        Ok(AgentResult {
            query: query.to_string(),
            answer,
            notes: state.into_notes(),
            outcome,
            truncated,
            pages_total,
            pages_scanned,
            failures,
        })
    }
}

/// Keep synthesizer errors under their own kind, whatever the cause
fn synthesis_error(err: Error) -> Error {
    match err.kind() {
        docscan_core::ErrorKind::SynthesisFailed => err,
        kind => Error::synthesis_failed(err.message().to_string())
            .with_context("cause", kind.as_str())
            .set_source(err),
    }
}
