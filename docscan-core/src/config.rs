//! Scan configuration
//!
//! Every field has a default, so a JSON config file only needs to name the
//! values it overrides:
//!
//! ```json
//! { "max_iterations": 20, "retry": { "max_attempts": 5 } }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default cap on steps per run
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Default per-attempt evaluator timeout
pub const DEFAULT_EVALUATOR_TIMEOUT_MS: u64 = 60_000;

/// Retry policy for a single page evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per page, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff_ms: u64,
    /// Growth factor applied to the delay after every failed attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            multiplier: 1.5,
        }
    }
}

impl RetryPolicy {
    /// A policy that gives every page exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis.round() as u64)
    }
}

/// Configuration for the scan controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Hard cap on steps per run
    pub max_iterations: usize,
    /// Per-attempt timeout for the page evaluator
    pub evaluator_timeout_ms: u64,
    /// Retry policy for failed evaluations
    pub retry: RetryPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            evaluator_timeout_ms: DEFAULT_EVALUATOR_TIMEOUT_MS,
            retry: RetryPolicy::default(),
        }
    }
}

impl ScanConfig {
    /// Load and validate a config from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("config::from_file")
                .with_context("path", path.display().to_string())
        })?;
        Self::from_json(&text)
            .map_err(|e| e.with_context("path", path.display().to_string()))
    }

    /// Parse and validate a config from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let config: ScanConfig = serde_json::from_str(text).map_err(|e| {
            Error::parse_failed(format!("invalid scan config: {}", e))
                .with_operation("config::from_json")
                .set_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_evaluator_timeout(mut self, timeout: Duration) -> Self {
        self.evaluator_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Per-attempt evaluator timeout as a `Duration`
    pub fn evaluator_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluator_timeout_ms)
    }

    /// Reject values the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.evaluator_timeout_ms == 0 {
            return Err(Error::config_invalid(
                "evaluator_timeout_ms",
                "evaluator timeout must be greater than zero",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config_invalid(
                "retry.max_attempts",
                "every page needs at least one attempt",
            ));
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(Error::config_invalid(
                "retry.multiplier",
                format!("backoff multiplier {} is below 1.0", self.retry.multiplier),
            ));
        }
        Ok(())
    }
}
