//! LLM backend clients: a provider-agnostic `LlmClient` trait plus concrete
//! Anthropic and Ollama implementations, selected at startup by
//! `AiConfig::provider`.
//!
//! Grounded on the teacher's `GroqLLM` client shape (a thin `reqwest`
//! wrapper building a JSON chat-completions body and parsing tool calls out
//! of the response), generalized to the two backends this gateway actually
//! targets.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{AiConfig, AiProvider, AnthropicConfig, OllamaConfig};

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("request to {provider} failed: {message}")]
    Request { provider: String, message: String },

    #[error("{provider} returned an error response: {message}")]
    ApiError { provider: String, message: String },

    #[error("failed to parse {provider} response: {0}", provider = provider)]
    ParseError { provider: String, message: String },

    #[error("no backend configured")]
    NoBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// A completion from one turn with a backend: either a final assistant
/// message, or one or more tool calls the router must execute and feed
/// back before asking the backend to continue.
#[derive(Debug, Clone)]
pub enum Completion {
    Message(String),
    ToolCalls(Vec<ToolCall>),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider_name(&self) -> &'static str;
    fn model_name(&self) -> &str;
    fn supports_streaming(&self) -> bool;

    async fn complete(
        &self,
        messages: &[Message],
        tool_definitions: &[Value],
    ) -> Result<Completion, LlmError>;

    async fn health_check(&self) -> bool;
}

/// Anthropic's Messages API. System prompt is sent via the top-level
/// `system` field rather than as a message, per Anthropic's wire format.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

const ANTHROPIC_MAX_TOKENS: u32 = 1024;

impl AnthropicClient {
    pub fn new(config: &AnthropicConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key().to_string(),
            model: config.model.clone(),
        }
    }

    fn split_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system = None;
        let mut rest = Vec::with_capacity(messages.len());
        for m in messages {
            if m.role == Role::System && system.is_none() {
                system = Some(m.content.clone());
            } else {
                rest.push(m);
            }
        }
        (system, rest)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        messages: &[Message],
        tool_definitions: &[Value],
    ) -> Result<Completion, LlmError> {
        let (system, rest) = Self::split_system(messages);
        let wire_messages: Vec<Value> = rest
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        Role::User | Role::System => "user",
                        Role::Assistant => "assistant",
                        Role::Tool => "user",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "messages": wire_messages,
        });
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }
        if !tool_definitions.is_empty() {
            body["tools"] = Value::Array(tool_definitions.to_vec());
        }

        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request {
                provider: "anthropic".to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                provider: "anthropic".to_string(),
                message: format!("{status}: {text}"),
            });
        }

        let parsed: Value = response.json().await.map_err(|e| LlmError::ParseError {
            provider: "anthropic".to_string(),
            message: e.to_string(),
        })?;

        parse_anthropic_response(&parsed)
    }

    async fn health_check(&self) -> bool {
        self.complete(&[Message::user("ping")], &[]).await.is_ok()
    }
}

fn parse_anthropic_response(parsed: &Value) -> Result<Completion, LlmError> {
    let blocks = parsed
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::ParseError {
            provider: "anthropic".to_string(),
            message: "missing 'content' array".to_string(),
        })?;

    let mut tool_calls = Vec::new();
    let mut text = String::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                let arguments = block.get("input").cloned().unwrap_or(Value::Null);
                tool_calls.push(ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments,
                });
            }
            _ => {}
        }
    }

    if !tool_calls.is_empty() {
        Ok(Completion::ToolCalls(tool_calls))
    } else {
        Ok(Completion::Message(text))
    }
}

/// A local Ollama server speaking its `/api/chat` endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &'static str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    async fn complete(
        &self,
        messages: &[Message],
        tool_definitions: &[Value],
    ) -> Result<Completion, LlmError> {
        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                        Role::Tool => "tool",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": wire_messages,
            "stream": false,
        });
        if !tool_definitions.is_empty() {
            body["tools"] = Value::Array(tool_definitions.to_vec());
        }

        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request {
                provider: "ollama".to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                provider: "ollama".to_string(),
                message: format!("{status}: {text}"),
            });
        }

        let parsed: Value = response.json().await.map_err(|e| LlmError::ParseError {
            provider: "ollama".to_string(),
            message: e.to_string(),
        })?;

        parse_ollama_response(&parsed)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url.trim_end_matches('/'));
        self.http
            .get(&url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

fn parse_ollama_response(parsed: &Value) -> Result<Completion, LlmError> {
    let message = parsed.get("message").ok_or_else(|| LlmError::ParseError {
        provider: "ollama".to_string(),
        message: "missing 'message'".to_string(),
    })?;

    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        if !calls.is_empty() {
            let tool_calls = calls
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let function = c.get("function").cloned().unwrap_or(Value::Null);
                    ToolCall {
                        id: format!("ollama-call-{i}"),
                        name: function
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        arguments: function.get("arguments").cloned().unwrap_or(Value::Null),
                    }
                })
                .collect();
            return Ok(Completion::ToolCalls(tool_calls));
        }
    }

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(Completion::Message(text))
}

/// Build the configured backend client from the loaded configuration.
pub fn build_client(
    ai: &AiConfig,
    anthropic: Option<&AnthropicConfig>,
    ollama: &OllamaConfig,
) -> Result<Box<dyn LlmClient>, LlmError> {
    match ai.provider {
        AiProvider::Anthropic => anthropic
            .map(|c| Box::new(AnthropicClient::new(c)) as Box<dyn LlmClient>)
            .ok_or(LlmError::NoBackend),
        AiProvider::Ollama => Ok(Box::new(OllamaClient::new(ollama.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_response_with_text_block_parses_as_message() {
        let parsed = serde_json::json!({
            "content": [{"type": "text", "text": "hello there"}]
        });
        match parse_anthropic_response(&parsed).unwrap() {
            Completion::Message(text) => assert_eq!(text, "hello there"),
            Completion::ToolCalls(_) => panic!("expected message"),
        }
    }

    #[test]
    fn anthropic_response_with_tool_use_parses_as_tool_calls() {
        let parsed = serde_json::json!({
            "content": [
                {"type": "tool_use", "id": "call_1", "name": "get_current_datetime", "input": {}}
            ]
        });
        match parse_anthropic_response(&parsed).unwrap() {
            Completion::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "get_current_datetime");
            }
            Completion::Message(_) => panic!("expected tool calls"),
        }
    }

    #[test]
    fn ollama_response_without_tool_calls_parses_as_message() {
        let parsed = serde_json::json!({"message": {"role": "assistant", "content": "hi"}});
        match parse_ollama_response(&parsed).unwrap() {
            Completion::Message(text) => assert_eq!(text, "hi"),
            Completion::ToolCalls(_) => panic!("expected message"),
        }
    }

    #[test]
    fn ollama_response_with_tool_calls_parses_as_tool_calls() {
        let parsed = serde_json::json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "get_current_datetime", "arguments": {}}}]
            }
        });
        match parse_ollama_response(&parsed).unwrap() {
            Completion::ToolCalls(calls) => assert_eq!(calls[0].name, "get_current_datetime"),
            Completion::Message(_) => panic!("expected tool calls"),
        }
    }

    #[test]
    fn message_constructors_set_expected_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
        let tool_msg = Message::tool_result("id1", "result");
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("id1"));
    }
}
