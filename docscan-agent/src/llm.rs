//! LLM-backed page evaluator and answer synthesizer

use crate::prompts::{self, VERDICT_TOOL};
use docscan_core::{
    render_knowledge_base, AnswerSynthesizer, ChatMessage, CompletionRequest, CompletionResponse,
    Error, LlmProvider, PageEvaluator, ProviderError, Result, ToolChoice, ToolDefinition, Verdict,
    NO_INFORMATION_ANSWER,
};
use docscan_core::error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

// ============================================================================
// Evaluator
// ============================================================================

/// Reply budget for one verdict; a tool call with a short summary fits easily
pub const VERDICT_MAX_TOKENS: usize = 300;

/// Asks a model for a verdict on each page via a forced tool call
pub struct LlmEvaluator<P> {
    provider: P,
    model: Option<String>,
}

impl<P: LlmProvider> LlmEvaluator<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            model: None,
        }
    }

    /// Override the provider's default model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    fn request(&self, query: &str, page: &str) -> CompletionRequest {
        let tool = ToolDefinition::new(VERDICT_TOOL, "Record the relevance verdict for this page")
            .with_parameters(prompts::verdict_tool_parameters());

        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompts::READER_SYSTEM),
            ChatMessage::user(prompts::reader_prompt(query, page)),
        ])
        .with_temperature(0.0)
        .with_max_tokens(VERDICT_MAX_TOKENS)
        .with_tools(vec![tool])
        .with_tool_choice(ToolChoice::Function {
            name: VERDICT_TOOL.to_string(),
        });

        match &self.model {
            Some(model) => request.with_model(model),
            None => request,
        }
    }
}

impl<P: LlmProvider> PageEvaluator for LlmEvaluator<P> {
    async fn evaluate(&self, query: &str, page: &str) -> Result<Verdict> {
        let response = self
            .provider
            .complete(self.request(query, page))
            .await
            .map_err(|e| provider_failure(Error::evaluator_failed("verdict request failed"), e))?;

        debug!(
            provider = self.provider.name(),
            tokens = response.usage.total_tokens,
            "page verdict received"
        );
        parse_verdict(&response)
    }
}

/// Read the verdict from the tool call, falling back to JSON in the text
pub fn parse_verdict(response: &CompletionResponse) -> Result<Verdict> {
    if let Some(call) = response.tool_calls.iter().find(|c| c.name == VERDICT_TOOL) {
        return call.parse_arguments::<Verdict>().map_err(|e| {
            Error::evaluator_failed(format!("malformed {} arguments: {}", VERDICT_TOOL, e))
                .temporary()
                .with_operation("evaluator::parse_verdict")
                .with_context("arguments", call.arguments.clone())
                .set_source(e)
        });
    }

    let content = response.content.as_deref().unwrap_or_default();
    let json = strip_code_fence(content);
    serde_json::from_str::<Verdict>(json).map_err(|e| {
        Error::evaluator_failed(format!("model returned no verdict: {}", e))
            .temporary()
            .with_operation("evaluator::parse_verdict")
            .with_context("content", content.chars().take(200).collect::<String>())
            .set_source(e)
    })
}

/// Extract the body of a markdown code fence, if the text has one
pub fn strip_code_fence(content: &str) -> &str {
    if content.contains("```json") {
        content
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .unwrap_or(content)
    } else if content.contains("```") {
        content
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .unwrap_or(content)
    } else {
        content.trim()
    }
}

/// Attach a provider failure to `err`, inheriting its retryability
fn provider_failure(err: Error, cause: ProviderError) -> Error {
    let err = if cause.is_retryable() {
        err.temporary()
    } else {
        err.permanent()
    };
    let err = match cause.retry_after() {
        Some(delay) => error::with_retry_after(err, delay),
        None => err,
    };
    err.with_context("cause", cause.kind().as_str())
        .with_operation("llm::complete")
        .set_source(cause)
}

// ============================================================================
// Synthesizer
// ============================================================================

/// Writes the final answer from the notes with a model.
///
/// Empty notes never reach the model; the answer is then
/// [`NO_INFORMATION_ANSWER`].
pub struct LlmSynthesizer<P> {
    provider: P,
    model: Option<String>,
    sink: Option<UnboundedSender<String>>,
}

impl<P: LlmProvider> LlmSynthesizer<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            model: None,
            sink: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Stream the answer, forwarding every text delta to `sink`
    pub fn with_stream_sink(mut self, sink: UnboundedSender<String>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn request(&self, query: &str, notes: &[String]) -> CompletionRequest {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompts::WRITER_SYSTEM),
            ChatMessage::user(prompts::writer_prompt(query, &render_knowledge_base(notes))),
        ]);
        match &self.model {
            Some(model) => request.with_model(model),
            None => request,
        }
    }
}

impl<P: LlmProvider> AnswerSynthesizer for LlmSynthesizer<P> {
    async fn synthesize(&self, query: &str, notes: &[String]) -> Result<String> {
        if notes.is_empty() {
            return Ok(NO_INFORMATION_ANSWER.to_string());
        }

        let request = self.request(query, notes);
        let answer = match &self.sink {
            Some(sink) => {
                let receiver = self
                    .provider
                    .stream(request)
                    .await
                    .map_err(|e| provider_failure(Error::synthesis_failed("answer stream failed"), e))?;
                receiver
                    .collect_text_with(|delta| {
                        // A closed sink only means nobody is watching the stream
                        let _ = sink.send(delta.to_string());
                    })
                    .await
                    .map_err(|e| provider_failure(Error::synthesis_failed("answer stream broke"), e))?
            }
            None => self
                .provider
                .complete(request)
                .await
                .map_err(|e| provider_failure(Error::synthesis_failed("answer request failed"), e))?
                .content
                .unwrap_or_default(),
        };

        if answer.trim().is_empty() {
            return Err(Error::synthesis_failed("model returned an empty answer")
                .with_operation("synthesizer::llm"));
        }
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docscan_core::{ErrorKind, FinishReason, StreamChunk, StreamReceiver, ToolCall, Usage};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records the requests it saw
    #[derive(Default)]
    struct ScriptedProvider {
        responses: Mutex<VecDeque<std::result::Result<CompletionResponse, ProviderError>>>,
        chunks: Mutex<Vec<StreamChunk>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn replying(responses: Vec<std::result::Result<CompletionResponse, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Other("script exhausted".into())))
        }

        async fn stream(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<StreamReceiver, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let chunks = std::mem::take(&mut *self.chunks.lock().unwrap());
            Ok(StreamReceiver::new(futures_util::stream::iter(chunks)))
        }
    }

    fn text(content: &str) -> CompletionResponse {
        CompletionResponse {
            id: "resp".into(),
            model: "scripted-model".into(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        }
    }

    fn tool_call(arguments: &str) -> CompletionResponse {
        CompletionResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: VERDICT_TOOL.into(),
                arguments: arguments.into(),
            }],
            finish_reason: FinishReason::ToolCalls,
            ..text("")
        }
    }

    fn notes(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"relevant\": false}\n```"), "{\"relevant\": false}");
        assert_eq!(strip_code_fence("Sure:\n```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"relevant\": true}  "), "{\"relevant\": true}");
    }

    #[test]
    fn test_verdict_from_tool_call() {
        let provider = ScriptedProvider::replying(vec![Ok(tool_call(
            r#"{"relevant": true, "summary": "Pizza Day moved to Friday"}"#,
        ))]);
        let evaluator = LlmEvaluator::new(provider).with_model("gpt-4.1-mini");

        let verdict =
            tokio_test::block_on(evaluator.evaluate("What day is pizza day?", "page 8")).unwrap();
        assert_eq!(verdict, Verdict::relevant("Pizza Day moved to Friday"));

        let requests = evaluator.provider.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.model.as_deref(), Some("gpt-4.1-mini"));
        assert_eq!(
            request.tool_choice,
            Some(ToolChoice::Function { name: VERDICT_TOOL.into() })
        );
        assert_eq!(request.max_tokens, Some(VERDICT_MAX_TOKENS));
        assert!(request.messages[1].content.contains("page 8"));
    }

    #[test]
    fn test_verdict_from_fenced_text() {
        let provider =
            ScriptedProvider::replying(vec![Ok(text("```json\n{\"relevant\": false}\n```"))]);
        let verdict =
            tokio_test::block_on(LlmEvaluator::new(provider).evaluate("q", "p")).unwrap();
        assert_eq!(verdict, Verdict::irrelevant());
    }

    #[test]
    fn test_unparseable_verdict_is_retryable() {
        let provider = ScriptedProvider::replying(vec![Ok(text("I think it is relevant."))]);
        let err = tokio_test::block_on(LlmEvaluator::new(provider).evaluate("q", "p")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EvaluatorFailed);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_provider_failure_statuses() {
        let provider = ScriptedProvider::replying(vec![
            Err(ProviderError::Network("connection reset".into())),
            Err(ProviderError::AuthenticationFailed),
        ]);
        let evaluator = LlmEvaluator::new(provider);

        let err = tokio_test::block_on(evaluator.evaluate("q", "p")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EvaluatorFailed);
        assert!(err.is_retryable());
        assert!(err.context().iter().any(|(k, v)| *k == "cause" && v == "NetworkFailed"));

        let err = tokio_test::block_on(evaluator.evaluate("q", "p")).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rate_limit_keeps_server_delay() {
        let provider = ScriptedProvider::replying(vec![Err(ProviderError::RateLimited {
            retry_after: Some(3),
        })]);
        let err = tokio_test::block_on(LlmEvaluator::new(provider).evaluate("q", "p")).unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(error::retry_after(&err), Some(std::time::Duration::from_secs(3)));
    }

    #[test]
    fn test_synthesizer_skips_model_for_empty_notes() {
        let synthesizer = LlmSynthesizer::new(ScriptedProvider::default());
        let answer = tokio_test::block_on(synthesizer.synthesize("q", &[])).unwrap();
        assert_eq!(answer, NO_INFORMATION_ANSWER);
        assert_eq!(synthesizer.provider.request_count(), 0);
    }

    #[test]
    fn test_synthesizer_sends_knowledge_base() {
        let provider = ScriptedProvider::replying(vec![Ok(text(" Pizza Day is on Friday now. "))]);
        let synthesizer = LlmSynthesizer::new(provider);

        let answer = tokio_test::block_on(synthesizer.synthesize(
            "What day is pizza day?",
            &notes(&["Pizza day: Monday", "Pizza day moved to Friday"]),
        ))
        .unwrap();
        assert_eq!(answer, "Pizza Day is on Friday now.");

        let requests = synthesizer.provider.requests.lock().unwrap();
        let user = &requests[0].messages[1].content;
        assert!(user.contains("- Pizza day: Monday\n- Pizza day moved to Friday"));
    }

    #[test]
    fn test_synthesizer_rejects_empty_answer() {
        let provider = ScriptedProvider::replying(vec![Ok(text("   "))]);
        let err = tokio_test::block_on(LlmSynthesizer::new(provider).synthesize("q", &notes(&["n"])))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SynthesisFailed);
    }

    #[test]
    fn test_synthesizer_streams_to_sink() {
        let provider = ScriptedProvider::default();
        *provider.chunks.lock().unwrap() = vec![
            StreamChunk::Text("Pizza Day ".into()),
            StreamChunk::Text("is Friday.".into()),
            StreamChunk::Done { finish_reason: FinishReason::Stop },
        ];
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let synthesizer = LlmSynthesizer::new(provider).with_stream_sink(tx);

        let answer =
            tokio_test::block_on(synthesizer.synthesize("q", &notes(&["Pizza moved to Friday"])))
                .unwrap();
        assert_eq!(answer, "Pizza Day is Friday.");
        assert_eq!(rx.try_recv().unwrap(), "Pizza Day ");
        assert_eq!(rx.try_recv().unwrap(), "is Friday.");
    }
}
