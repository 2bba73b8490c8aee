//! # docscan agent
//!
//! The agent chains three roles over one query:
//! 1. Setup: fetch the page list and build the scan state
//! 2. Scan loop: evaluate pages one by one, accumulating notes, never
//!    stopping early because an answer turned up
//! 3. Synthesis: answer the query from the notes alone
//!
//! The evaluator and synthesizer are pluggable; `llm` provides versions
//! backed by a chat-completions model.

mod agent;
pub mod llm;
pub mod prompts;

pub use agent::{AgentConfig, AgentResult, DocAgent};
pub use llm::{LlmEvaluator, LlmSynthesizer};
