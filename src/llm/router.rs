//! AI router: turns one transcribed utterance into a spoken-ready reply,
//! driving the configured [`LlmClient`] through however many tool-call
//! round trips it asks for.
//!
//! Grounded on the teacher's `LLMIntegration::process_user_instruction` —
//! same empty-transcript silent-abort, same `tokio::select!` cancellation
//! race against the backend call, same tool-call-then-continue loop — with
//! the teacher's single hardcoded backend and two-tool dispatch widened
//! into the `LlmClient`/`ToolRegistry` trait objects built elsewhere in
//! this module and in `crate::tools`.

use tokio_util::sync::CancellationToken;

use super::client::{Completion, LlmClient, Message};
use super::context::ConversationContext;
use super::prompts::build_system_prompt;
use crate::intent;
use crate::tools::{Executor, ToolRegistry};

/// Tool-call round trips allowed before the router gives up and returns
/// whatever text the backend last produced, so a misbehaving backend that
/// keeps requesting tools can't loop forever.
const MAX_TOOL_ROUNDS: u32 = 4;

/// Snapshot returned by [`AiRouter::health_check`], the combined
/// `healthy`/`provider`/`model`/`streamingEnabled` tuple the startup
/// orchestrator logs once at boot.
#[derive(Debug, Clone)]
pub struct RouterHealth {
    pub healthy: bool,
    pub provider: String,
    pub model: String,
    pub streaming_enabled: bool,
}

pub struct AiRouter {
    client: Box<dyn LlmClient>,
    tools: ToolRegistry,
    executor: Executor,
    context: ConversationContext,
    configured_system_prompt: Option<String>,
    suppress_think_tags: bool,
}

impl AiRouter {
    pub fn new(
        client: Box<dyn LlmClient>,
        tools: ToolRegistry,
        configured_system_prompt: Option<String>,
    ) -> Self {
        let suppress_think_tags = client.provider_name() == "ollama";
        Self {
            client,
            tools,
            executor: Executor::default(),
            context: ConversationContext::default(),
            configured_system_prompt,
            suppress_think_tags,
        }
    }

    pub fn context_summary(&self) -> String {
        format!(
            "{} messages retained, provider={} model={}",
            self.context.len(),
            self.client.provider_name(),
            self.client.model_name()
        )
    }

    pub fn clear_context(&mut self) {
        self.context.clear();
    }

    /// Streaming is only worth taking if the backend can produce a
    /// token stream *and* the configured TTS provider can consume one;
    /// either half missing means the router should fall back to the
    /// one-shot completion path.
    pub fn is_streaming_enabled(&self, tts_supports_streaming: bool, tts_streaming_configured: bool) -> bool {
        self.client.supports_streaming() && tts_supports_streaming && tts_streaming_configured
    }

    /// Reachability check surfaced by the startup orchestrator and by any
    /// future status endpoint: reports the backend in use regardless of
    /// whether it's currently healthy, so a failed check still says what
    /// was being checked.
    pub async fn health_check(&self, tts_supports_streaming: bool, tts_streaming_configured: bool) -> RouterHealth {
        RouterHealth {
            healthy: self.client.health_check().await,
            provider: self.client.provider_name().to_string(),
            model: self.client.model_name().to_string(),
            streaming_enabled: self.is_streaming_enabled(tts_supports_streaming, tts_streaming_configured),
        }
    }

    /// Process one completed utterance transcript. Returns `None` for an
    /// empty transcript (nothing was said, or STT returned nothing usable)
    /// or if `cancel` fires before a reply is ready — both are silent
    /// aborts, not errors, since barge-in and empty utterances are routine.
    pub async fn process_user_instruction(
        &mut self,
        transcript: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        if transcript.trim().is_empty() {
            log::debug!("router: empty transcript, nothing to do");
            return None;
        }

        let intent = intent::classify(Some(transcript));
        let system_prompt = build_system_prompt(
            self.configured_system_prompt.as_deref(),
            self.suppress_think_tags,
            &intent,
        );

        self.context.push(Message::user(transcript));

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("router: cancelled before a reply was produced");
                None
            }
            reply = self.run_completion_loop(&system_prompt, cancel) => reply,
        };

        if let Some(text) = &reply {
            self.context.push(Message::assistant(text.clone()));
        }
        reply
    }

    async fn run_completion_loop(
        &mut self,
        system_prompt: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let tool_definitions = self.tools.tool_definitions();

        for round in 0..=MAX_TOOL_ROUNDS {
            let messages = self.context.to_request(system_prompt);
            let completion = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                result = self.client.complete(&messages, &tool_definitions) => result,
            };

            let completion = match completion {
                Ok(c) => c,
                Err(e) => {
                    log::error!("llm backend error: {e}");
                    return Some(
                        "Sorry, I couldn't reach the language model right now.".to_string(),
                    );
                }
            };

            match completion {
                Completion::Message(text) => return Some(text),
                Completion::ToolCalls(calls) => {
                    if round == MAX_TOOL_ROUNDS {
                        log::warn!("router: tool-call round limit reached, giving up");
                        return Some(
                            "Sorry, I wasn't able to finish that request.".to_string(),
                        );
                    }
                    for call in calls {
                        if cancel.is_cancelled() {
                            return None;
                        }
                        let result = self
                            .executor
                            .execute(&self.tools, &call.name, call.arguments.clone())
                            .await;
                        self.context.push(Message {
                            role: super::client::Role::Assistant,
                            content: String::new(),
                            tool_call_id: None,
                            tool_calls: vec![call.clone()],
                        });
                        self.context.push(Message::tool_result(call.id, result));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct StubClient {
        responses: std::sync::Mutex<Vec<Completion>>,
    }

    #[async_trait]
    impl LlmClient for StubClient {
        fn provider_name(&self) -> &'static str {
            "stub"
        }
        fn model_name(&self) -> &str {
            "stub-model"
        }
        fn supports_streaming(&self) -> bool {
            false
        }
        async fn complete(
            &self,
            _messages: &[Message],
            _tool_definitions: &[Value],
        ) -> Result<Completion, super::super::client::LlmError> {
            Ok(self.responses.lock().unwrap().remove(0))
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn streaming_requires_backend_and_tts_and_config_all_enabled() {
        let client = StubClient {
            responses: std::sync::Mutex::new(vec![]),
        };
        let router = AiRouter::new(Box::new(client), ToolRegistry::new(), None);
        assert!(!router.is_streaming_enabled(true, true), "stub backend doesn't support streaming");
    }

    #[tokio::test]
    async fn health_check_reports_provider_and_model() {
        let client = StubClient {
            responses: std::sync::Mutex::new(vec![]),
        };
        let router = AiRouter::new(Box::new(client), ToolRegistry::new(), None);
        let health = router.health_check(true, true).await;
        assert!(health.healthy);
        assert_eq!(health.provider, "stub");
        assert_eq!(health.model, "stub-model");
        assert!(!health.streaming_enabled);
    }

    #[tokio::test]
    async fn empty_transcript_returns_none_without_calling_the_backend() {
        let client = StubClient {
            responses: std::sync::Mutex::new(vec![]),
        };
        let mut router = AiRouter::new(Box::new(client), ToolRegistry::new(), None);
        let cancel = CancellationToken::new();
        assert_eq!(router.process_user_instruction("   ", &cancel).await, None);
    }

    #[tokio::test]
    async fn plain_message_completion_is_returned_and_stored_in_context() {
        let client = StubClient {
            responses: std::sync::Mutex::new(vec![Completion::Message("hi there".to_string())]),
        };
        let mut router = AiRouter::new(Box::new(client), ToolRegistry::new(), None);
        let cancel = CancellationToken::new();
        let reply = router
            .process_user_instruction("what time is it", &cancel)
            .await;
        assert_eq!(reply.as_deref(), Some("hi there"));
        assert_eq!(router.context.len(), 2);
    }

    #[tokio::test]
    async fn cancellation_before_completion_returns_none() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let client = StubClient {
            responses: std::sync::Mutex::new(vec![Completion::Message("unused".to_string())]),
        };
        let mut router = AiRouter::new(Box::new(client), ToolRegistry::new(), None);
        let reply = router.process_user_instruction("hello", &cancel).await;
        assert_eq!(reply, None);
    }

    struct CountingTool {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl crate::tools::ToolDescriptor for CountingTool {
        fn name(&self) -> &str {
            "get_current_datetime"
        }
        fn description(&self) -> &str {
            "returns the time"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({})
        }
        async fn invoke(&self, _args: Value) -> Result<String, crate::tools::ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("2026-07-28T00:00:00Z".to_string())
        }
    }

    #[tokio::test]
    async fn tool_call_round_trip_feeds_result_back_before_final_message() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::new();
        registry.add_builtin(Box::new(CountingTool {
            calls: calls.clone(),
        }));

        let client = StubClient {
            responses: std::sync::Mutex::new(vec![
                Completion::ToolCalls(vec![super::super::client::ToolCall {
                    id: "call_1".to_string(),
                    name: "get_current_datetime".to_string(),
                    arguments: serde_json::json!({}),
                }]),
                Completion::Message("it's midnight".to_string()),
            ]),
        };
        let mut router = AiRouter::new(Box::new(client), registry, None);
        let cancel = CancellationToken::new();
        let reply = router
            .process_user_instruction("what time is it", &cancel)
            .await;
        assert_eq!(reply.as_deref(), Some("it's midnight"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
