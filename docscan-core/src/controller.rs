//! # Scan Controller
//!
//! Drives a bounded, strictly sequential scan:
//! 1. `initialize` fetches the pages and builds a [`ScanState`]
//! 2. `step` evaluates the current page, records its note, advances
//! 3. `run` repeats `step` until the pages are exhausted, the iteration cap
//!    is hit, or the caller cancels
//!
//! Finding an answer never stops the scan early: a later page may supersede
//! an earlier one, and only a full, in-order pass keeps the newest fact last.

use crate::config::ScanConfig;
use crate::error::{self, Result};
use crate::evaluator::{PageEvaluator, Verdict};
use crate::source::DocumentSource;
use crate::state::{PageFailure, ScanState};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a single `step` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A page was evaluated and more pages remain
    Continue,
    /// No pages remain (either just now, or already before the call)
    Exhausted,
}

/// How a `run` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every page was visited
    Exhausted { steps: usize },
    /// The iteration cap was reached with pages left
    Truncated { steps: usize },
    /// The caller cancelled between steps
    Cancelled { steps: usize },
}

impl RunOutcome {
    /// Steps executed by the run
    pub fn steps(&self) -> usize {
        match self {
            RunOutcome::Exhausted { steps }
            | RunOutcome::Truncated { steps }
            | RunOutcome::Cancelled { steps } => *steps,
        }
    }

    /// Whether the scan ended naturally
    pub fn is_complete(&self) -> bool {
        matches!(self, RunOutcome::Exhausted { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Exhausted { .. } => "exhausted",
            RunOutcome::Truncated { .. } => "truncated",
            RunOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

/// Cooperative cancellation for a run, checked between steps
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so a cancelled state can be resumed
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The scan loop, generic over its two collaborators
pub struct ScanController<S, E> {
    source: S,
    evaluator: E,
    config: ScanConfig,
}

impl<S, E> ScanController<S, E>
where
    S: DocumentSource,
    E: PageEvaluator,
{
    /// Create a controller with the default configuration
    pub fn new(source: S, evaluator: E) -> Self {
        Self::with_config(source, evaluator, ScanConfig::default())
    }

    pub fn with_config(source: S, evaluator: E, config: ScanConfig) -> Self {
        Self {
            source,
            evaluator,
            config,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Fetch the pages for `query` and build the initial state.
    ///
    /// An empty page sequence is a valid, already finished scan.
    pub async fn initialize(&self, query: &str) -> Result<ScanState> {
        let pages = self
            .source
            .fetch(query)
            .await
            .map_err(|e| error::source_unavailable(e).with_context("query", query))?;

        if pages.is_empty() {
            info!("document source returned no pages, nothing to scan");
        }
        Ok(ScanState::new(query, pages))
    }

    /// Evaluate the current page and advance.
    ///
    /// On a finished state this is a no-op.
    pub async fn step(&self, state: &mut ScanState) -> StepOutcome {
        if state.is_done() {
            return StepOutcome::Exhausted;
        }

        let index = state.current_index();
        let total = state.pages().len();
        let evaluation = match state.current_page() {
            Some(page) => self.evaluate_page(state.query(), page, index).await,
            None => return StepOutcome::Exhausted,
        };

        match evaluation {
            Ok(verdict) => record_verdict(state, index, verdict),
            Err(failure) => state.record_failure(failure),
        }

        let done = state.advance();
        debug!(next = index + 1, total, "advancing scan");
        if done {
            info!(pages = total, notes = state.notes().len(), "all pages processed");
            StepOutcome::Exhausted
        } else {
            StepOutcome::Continue
        }
    }

    /// Step until done or `max_iterations` steps have run
    pub async fn run(&self, state: &mut ScanState, max_iterations: usize) -> RunOutcome {
        self.drive(state, max_iterations, None).await
    }

    /// Like [`run`](Self::run), checking `cancel` before every step
    pub async fn run_with_cancel(
        &self,
        state: &mut ScanState,
        max_iterations: usize,
        cancel: &CancelFlag,
    ) -> RunOutcome {
        self.drive(state, max_iterations, Some(cancel)).await
    }

    /// Initialize and run with the configured cap
    pub async fn scan(&self, query: &str) -> Result<(ScanState, RunOutcome)> {
        let mut state = self.initialize(query).await?;
        let outcome = self.run(&mut state, self.config.max_iterations).await;
        Ok((state, outcome))
    }

    async fn drive(
        &self,
        state: &mut ScanState,
        max_iterations: usize,
        cancel: Option<&CancelFlag>,
    ) -> RunOutcome {
        let mut steps = 0;
        while !state.is_done() {
            if steps >= max_iterations {
                warn!(
                    steps,
                    remaining = state.remaining(),
                    "iteration cap reached, scan truncated"
                );
                return RunOutcome::Truncated { steps };
            }
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                info!(steps, index = state.current_index(), "scan cancelled");
                return RunOutcome::Cancelled { steps };
            }
            self.step(state).await;
            steps += 1;
        }
        RunOutcome::Exhausted { steps }
    }

    /// One page under the timeout and retry policy.
    ///
    /// Returns the failure to record once retries are spent.
    async fn evaluate_page(
        &self,
        query: &str,
        page: &str,
        index: usize,
    ) -> std::result::Result<Verdict, PageFailure> {
        let policy = &self.config.retry;
        let timeout = self.config.evaluator_timeout();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(timeout, self.evaluator.evaluate(query, page)).await
            {
                Ok(result) => result,
                Err(_) => Err(error::evaluator_timeout(self.config.evaluator_timeout_ms, index)),
            };

            let err = match result {
                Ok(verdict) => return Ok(verdict),
                Err(err) => err
                    .with_operation("controller::evaluate_page")
                    .with_context("attempt", attempt.to_string()),
            };

            if err.is_retryable() && attempt < policy.max_attempts {
                // A server-requested delay wins over the backoff, up to one timeout
                let requested =
                    error::retry_after(&err).map_or(Duration::ZERO, |d| d.min(timeout));
                let delay = policy.backoff(attempt).max(requested);
                warn!(
                    page = index,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "page evaluation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let err = err.persist();
            warn!(
                page = index,
                attempts = attempt,
                error = %err,
                "page evaluation abandoned, treating page as not relevant"
            );
            return Err(PageFailure::new(index, &err, attempt));
        }
    }
}

fn record_verdict(state: &mut ScanState, index: usize, verdict: Verdict) {
    if !verdict.relevant {
        info!(page = index, "skipping irrelevant page");
        return;
    }
    match verdict.into_note() {
        Some(note) => {
            info!(page = index, note = %note, "relevant page, saving note");
            state.push_note(note);
        }
        None => warn!(page = index, "page judged relevant without a note, nothing saved"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::error::{Error, ErrorKind};
    use crate::evaluator::{from_fn, KeywordEvaluator};
    use crate::source::StaticSource;
    use crate::state::ScanPhase;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Instant;

    fn pages(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("page {}", i)).collect()
    }

    /// Marks every page relevant with its own text as the note
    fn echo() -> impl PageEvaluator {
        from_fn(|_query, page| Ok(Verdict::relevant(page)))
    }

    fn fast_retry(max_attempts: u32) -> ScanConfig {
        ScanConfig::default().with_retry(RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            multiplier: 1.0,
        })
    }

    struct FailingSource;

    impl DocumentSource for FailingSource {
        async fn fetch(&self, _query: &str) -> Result<Vec<String>> {
            Err(Error::new(ErrorKind::NetworkFailed, "index unreachable"))
        }
    }

    /// Fails a given number of times with a temporary error, then succeeds
    struct Flaky {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    impl PageEvaluator for Flaky {
        async fn evaluate(&self, _query: &str, page: &str) -> Result<Verdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::evaluator_failed("sampling glitch").temporary());
            }
            Ok(Verdict::relevant(page))
        }
    }

    struct Slow {
        delay: Duration,
    }

    impl PageEvaluator for Slow {
        async fn evaluate(&self, _query: &str, _page: &str) -> Result<Verdict> {
            tokio::time::sleep(self.delay).await;
            Ok(Verdict::relevant("too late"))
        }
    }

    #[test]
    fn test_initialize() {
        let controller = ScanController::new(StaticSource::new(pages(3)), echo());
        let state = tokio_test::block_on(controller.initialize("q")).unwrap();

        assert_eq!(state.query(), "q");
        assert_eq!(state.pages().len(), 3);
        assert_eq!(state.phase(), ScanPhase::Initialized);
    }

    #[test]
    fn test_initialize_empty_source_is_done() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let evaluator = from_fn(move |_q, _p| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Verdict::irrelevant())
        });
        let controller = ScanController::new(StaticSource::default(), evaluator);

        let (state, outcome) = tokio_test::block_on(controller.scan("q")).unwrap();
        assert!(state.is_done());
        assert!(state.notes().is_empty());
        assert_eq!(outcome, RunOutcome::Exhausted { steps: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_initialize_source_failure() {
        let controller = ScanController::new(FailingSource, echo());
        let err = tokio_test::block_on(controller.initialize("q")).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
        assert!(err.context().iter().any(|(k, v)| *k == "query" && v == "q"));
    }

    #[test]
    fn test_run_visits_every_page_once() {
        for n in 1..=6 {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let log = seen.clone();
            let evaluator = from_fn(move |_q, page| {
                log.lock().unwrap().push(page.to_string());
                Ok(Verdict::irrelevant())
            });
            let controller = ScanController::new(StaticSource::new(pages(n)), evaluator);

            let mut state = tokio_test::block_on(controller.initialize("q")).unwrap();
            let outcome = tokio_test::block_on(controller.run(&mut state, n + 2));

            assert_eq!(outcome, RunOutcome::Exhausted { steps: n });
            assert!(state.is_done());
            assert_eq!(state.current_index(), n);
            assert_eq!(*seen.lock().unwrap(), pages(n));
        }
    }

    #[test]
    fn test_run_truncates_at_cap() {
        let controller = ScanController::new(StaticSource::new(pages(8)), echo());
        let mut state = tokio_test::block_on(controller.initialize("q")).unwrap();

        let outcome = tokio_test::block_on(controller.run(&mut state, 3));
        assert_eq!(outcome, RunOutcome::Truncated { steps: 3 });
        assert!(!outcome.is_complete());
        assert!(!state.is_done());
        assert_eq!(state.current_index(), 3);
        assert_eq!(state.notes(), &pages(3)[..]);
        assert_eq!(state.phase(), ScanPhase::Scanning);

        // A truncated state resumes where it stopped
        let outcome = tokio_test::block_on(controller.run(&mut state, 10));
        assert_eq!(outcome, RunOutcome::Exhausted { steps: 5 });
        assert_eq!(state.notes(), &pages(8)[..]);
    }

    #[test]
    fn test_zero_iterations() {
        let controller = ScanController::new(StaticSource::new(pages(2)), echo());
        let mut state = tokio_test::block_on(controller.initialize("q")).unwrap();
        let before = state.clone();

        let outcome = tokio_test::block_on(controller.run(&mut state, 0));
        assert_eq!(outcome, RunOutcome::Truncated { steps: 0 });
        assert_eq!(state, before);
    }

    #[test]
    fn test_step_on_done_state_is_noop() {
        let controller = ScanController::new(StaticSource::new(pages(2)), echo());
        let mut state = tokio_test::block_on(controller.initialize("q")).unwrap();
        tokio_test::block_on(controller.run(&mut state, 10));
        let finished = state.clone();

        for _ in 0..3 {
            let outcome = tokio_test::block_on(controller.step(&mut state));
            assert_eq!(outcome, StepOutcome::Exhausted);
            assert_eq!(state, finished);
        }
    }

    #[test]
    fn test_step_outcomes() {
        let controller = ScanController::new(StaticSource::new(pages(2)), echo());
        let mut state = tokio_test::block_on(controller.initialize("q")).unwrap();

        assert_eq!(tokio_test::block_on(controller.step(&mut state)), StepOutcome::Continue);
        assert_eq!(tokio_test::block_on(controller.step(&mut state)), StepOutcome::Exhausted);
        assert!(state.is_done());
    }

    #[test]
    fn test_notes_keep_page_order_without_dedup() {
        let evaluator = from_fn(|_q, page| match page {
            "a" | "c" => Ok(Verdict::relevant("same fact")),
            "d" => Ok(Verdict::relevant("newer fact")),
            _ => Ok(Verdict::irrelevant()),
        });
        let controller = ScanController::new(StaticSource::new(["a", "b", "c", "d"]), evaluator);

        let (state, _) = tokio_test::block_on(controller.scan("q")).unwrap();
        assert_eq!(state.notes(), &["same fact", "same fact", "newer fact"]);
    }

    #[test]
    fn test_relevant_without_note_is_tolerated() {
        let evaluator = from_fn(|_q, page| {
            Ok(Verdict {
                relevant: true,
                note: (page == "b").then(|| "  ".to_string()),
            })
        });
        let controller = ScanController::new(StaticSource::new(["a", "b"]), evaluator);

        let (state, outcome) = tokio_test::block_on(controller.scan("q")).unwrap();
        assert!(outcome.is_complete());
        assert!(state.notes().is_empty());
        assert!(state.failures().is_empty());
    }

    #[test]
    fn test_relevance_does_not_stop_scan() {
        let scenario = [
            "Monday is Pizza Day",
            "(unrelated)",
            "Monday Pizza Day is CANCELLED, moved to Friday",
        ];
        let evaluator = from_fn(|_q, page| {
            Ok(if page.contains("CANCELLED") {
                Verdict::relevant("Pizza day moved to Friday")
            } else if page.contains("Pizza") {
                Verdict::relevant("Pizza day: Monday")
            } else {
                Verdict::irrelevant()
            })
        });
        let controller = ScanController::new(StaticSource::new(scenario), evaluator);

        let (state, outcome) =
            tokio_test::block_on(controller.scan("What day is pizza day?")).unwrap();
        assert_eq!(outcome, RunOutcome::Exhausted { steps: 3 });
        assert_eq!(state.notes(), &["Pizza day: Monday", "Pizza day moved to Friday"]);
    }

    #[test]
    fn test_keyword_scan_of_demo_corpus() {
        let controller = ScanController::new(StaticSource::demo(), KeywordEvaluator::new());
        let (state, outcome) =
            tokio_test::block_on(controller.scan("What day is pizza day?")).unwrap();

        assert_eq!(outcome, RunOutcome::Exhausted { steps: 8 });
        assert_eq!(state.notes().len(), 2);
        assert!(state.notes()[0].contains("Monday: Pizza Day"));
        assert!(state.notes()[1].contains("moved to Friday"));
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let evaluator = Flaky {
            failures_left: AtomicUsize::new(2),
            calls: AtomicUsize::new(0),
        };
        let controller =
            ScanController::with_config(StaticSource::new(["only"]), evaluator, fast_retry(3));

        let (state, outcome) = tokio_test::block_on(controller.scan("q")).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(state.notes(), &["only"]);
        assert!(state.failures().is_empty());
        assert_eq!(controller.evaluator().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_retries_record_failure_and_continue() {
        let evaluator = from_fn(|_q, page| {
            if page == "bad" {
                Err(Error::evaluator_failed("model glitch").temporary())
            } else {
                Ok(Verdict::relevant(page))
            }
        });
        let controller = ScanController::with_config(
            StaticSource::new(["good", "bad", "fine"]),
            evaluator,
            fast_retry(3),
        );

        let (state, outcome) = tokio_test::block_on(controller.scan("q")).unwrap();
        assert_eq!(outcome, RunOutcome::Exhausted { steps: 3 });
        assert_eq!(state.notes(), &["good", "fine"]);

        let failures = state.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].attempts, 3);
        assert_eq!(failures[0].kind, "EvaluatorFailed");
        assert!(failures[0].message.contains("persistent"));
    }

    #[test]
    fn test_retry_waits_for_server_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let evaluator = from_fn(move |_q, page| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                let err = Error::evaluator_failed("rate limited").temporary();
                return Err(error::with_retry_after(err, Duration::from_millis(80)));
            }
            Ok(Verdict::relevant(page))
        });
        let controller =
            ScanController::with_config(StaticSource::new(["p"]), evaluator, fast_retry(2));

        let started = Instant::now();
        let (state, _) = tokio_test::block_on(controller.scan("q")).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(80));
        assert_eq!(state.notes(), &["p"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let evaluator = from_fn(move |_q, _p| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::evaluator_failed("page is not text"))
        });
        let controller =
            ScanController::with_config(StaticSource::new(["x"]), evaluator, fast_retry(3));

        let (state, _) = tokio_test::block_on(controller.scan("q")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.failures()[0].attempts, 1);
    }

    #[test]
    fn test_slow_evaluator_times_out() {
        let config = fast_retry(2).with_evaluator_timeout(Duration::from_millis(10));
        let controller = ScanController::with_config(
            StaticSource::new(["p"]),
            Slow {
                delay: Duration::from_millis(500),
            },
            config,
        );

        let (state, outcome) = tokio_test::block_on(controller.scan("q")).unwrap();
        assert!(outcome.is_complete());
        assert!(state.notes().is_empty());
        assert_eq!(state.failures().len(), 1);
        assert!(state.failures()[0].is_timeout());
        assert_eq!(state.failures()[0].attempts, 2);
    }

    #[test]
    fn test_cancel_between_steps() {
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let evaluator = from_fn(move |_q, page| {
            if page == "page 1" {
                trigger.cancel();
            }
            Ok(Verdict::relevant(page))
        });
        let controller = ScanController::new(StaticSource::new(pages(4)), evaluator);
        let mut state = tokio_test::block_on(controller.initialize("q")).unwrap();

        let outcome = tokio_test::block_on(controller.run_with_cancel(&mut state, 10, &cancel));
        assert_eq!(outcome, RunOutcome::Cancelled { steps: 2 });
        assert_eq!(outcome.label(), "cancelled");
        assert_eq!(state.current_index(), 2);
        assert!(!state.is_done());

        cancel.reset();
        let outcome = tokio_test::block_on(controller.run_with_cancel(&mut state, 10, &cancel));
        assert_eq!(outcome, RunOutcome::Exhausted { steps: 2 });
        assert_eq!(state.notes(), &pages(4)[..]);
    }

    #[test]
    fn test_cancel_before_first_step_leaves_state_untouched() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let controller = ScanController::new(StaticSource::new(pages(2)), echo());
        let mut state = tokio_test::block_on(controller.initialize("q")).unwrap();
        let before = state.clone();

        let outcome = tokio_test::block_on(controller.run_with_cancel(&mut state, 10, &cancel));
        assert_eq!(outcome, RunOutcome::Cancelled { steps: 0 });
        assert_eq!(state, before);
    }

    #[test]
    fn test_restored_state_counts_only_visited_pages() {
        let bad = r#"{"query":"q","pages":["page 0","page 1"],"current_index":5,"done":false}"#;
        assert!(serde_json::from_str::<ScanState>(bad).is_err());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let evaluator = from_fn(move |_q, page| {
            log.lock().unwrap().push(page.to_string());
            Ok(Verdict::relevant(page))
        });
        let controller = ScanController::new(StaticSource::new(pages(4)), evaluator);

        let saved = r#"{"query":"q","pages":["page 0","page 1","page 2","page 3"],
                        "current_index":1,"notes":["page 0"],"done":false}"#;
        let mut state: ScanState = serde_json::from_str(saved).unwrap();
        let outcome = tokio_test::block_on(controller.run(&mut state, 3));

        assert_eq!(outcome, RunOutcome::Exhausted { steps: 3 });
        assert_eq!(*seen.lock().unwrap(), ["page 1", "page 2", "page 3"]);
        assert_eq!(state.notes(), &pages(4)[..]);
    }

    #[test]
    fn test_run_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(RunOutcome::Truncated { steps: 10 }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "truncated", "steps": 10}));
    }
}
