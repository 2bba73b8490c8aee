//! # docscan core
//!
//! A bounded, strictly sequential scan over an ordered set of document pages.
//!
//! ## Core Concepts
//! - **Source**: produces the ordered page texts for a query
//! - **State**: explicit scan state (index, notes, done flag, failure log)
//! - **Evaluator**: judges one page at a time and may extract a note
//! - **Controller**: drives the loop under an iteration cap, timeouts and retries
//! - **Synthesizer**: turns the accumulated notes into an answer
//! - **Provider**: trait-based LLM communication (OpenAI-compatible endpoints)

pub mod error;
pub mod config;
pub mod state;
pub mod source;
pub mod evaluator;
pub mod synthesizer;
pub mod controller;
pub mod provider;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use config::{RetryPolicy, ScanConfig, DEFAULT_MAX_ITERATIONS};
pub use state::{render_knowledge_base, PageFailure, ScanPhase, ScanState};
pub use source::{demo_pages, DocumentSource, StaticSource, DEMO_PAGES};
pub use evaluator::{from_fn, FnEvaluator, KeywordEvaluator, PageEvaluator, Verdict};
pub use synthesizer::{AnswerSynthesizer, ExtractiveSynthesizer, NO_INFORMATION_ANSWER};
pub use controller::{CancelFlag, RunOutcome, ScanController, StepOutcome};
pub use provider::{
    LlmProvider, ProviderConfig, ProviderType, ProviderError,
    ChatMessage, Role, CompletionRequest, CompletionResponse,
    ToolDefinition, ToolCall, ToolChoice,
    StreamChunk, StreamReceiver, FinishReason, Usage,
    OpenAIProvider,
};
