//! Tool registry and executor: built-in tools plus MCP-discovered tools,
//! exposed to the AI router behind one trait so the two are indistinguishable
//! from the model's point of view.
//!
//! Generalizes the teacher's hardcoded `ToolRegistry`/`Tool` pair (which only
//! ever dispatched to two free functions by name) into trait objects, per
//! the "tool polymorphism" design note: built-in tools and MCP tools share
//! `{name, schema, invoke}` and differ only in how `invoke` is implemented.

pub mod builtin;
pub mod mcp;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub const TOOL_TIMEOUT_MS: u64 = 5000;

#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),
    #[error("tool '{0}' timed out")]
    Timeout(String),
    #[error("tool '{0}' failed: {1}")]
    Failed(String, String),
    #[error("invalid arguments for tool '{0}': {1}")]
    InvalidArguments(String, String),
}

/// A tool the AI router can bind into a request and the executor can invoke.
/// Built-in tools implement this directly; MCP-discovered tools are wrapped
/// by [`mcp::McpToolDescriptor`].
#[async_trait]
pub trait ToolDescriptor: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;

    /// Per-tool snake_case -> camelCase parameter renames applied before
    /// `invoke`. Empty by default; values are never modified, only keys.
    fn parameter_map(&self) -> &HashMap<String, String> {
        static EMPTY: once_cell::sync::Lazy<HashMap<String, String>> =
            once_cell::sync::Lazy::new(HashMap::new);
        &EMPTY
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError>;
}

/// Holds built-in tools plus whatever MCP discovery surfaced. Names must be
/// unique; a later `add_external` with a colliding name is dropped with a
/// warning so a misbehaving MCP server cannot shadow a built-in.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_builtin(&mut self, tool: Box<dyn ToolDescriptor>) {
        self.tools.push(tool);
    }

    pub fn add_external(&mut self, tools: Vec<Box<dyn ToolDescriptor>>) {
        for tool in tools {
            if self.find(tool.name()).is_some() {
                log::warn!(
                    "MCP tool '{}' collides with an already-registered tool, dropping",
                    tool.name()
                );
                continue;
            }
            self.tools.push(tool);
        }
    }

    pub fn find(&self, name: &str) -> Option<&dyn ToolDescriptor> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn all(&self) -> &[Box<dyn ToolDescriptor>] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// JSON tool definitions in the shape most chat-completion APIs expect,
    /// for the AI router to attach to a request.
    pub fn tool_definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "input_schema": t.input_schema(),
                })
            })
            .collect()
    }
}

/// snake_case -> camelCase, for parameter keys the registry has no explicit
/// mapping for.
fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Runs tool invocations against a [`ToolRegistry`] with parameter
/// normalization, a timeout, and translation of raw errors into short,
/// speakable strings. Never returns an `Err`: every path produces a string
/// suitable to hand straight back to the conversation.
pub struct Executor {
    timeout: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(Duration::from_millis(TOOL_TIMEOUT_MS))
    }
}

impl Executor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Apply the tool's explicit parameter map, falling back to a generic
    /// snake_case -> camelCase transform for any key the map doesn't cover.
    /// Values are passed through untouched.
    fn normalize_args(tool: &dyn ToolDescriptor, args: Value) -> Value {
        let Value::Object(map) = args else {
            return args;
        };
        let parameter_map = tool.parameter_map();
        let normalized: serde_json::Map<String, Value> = map
            .into_iter()
            .map(|(k, v)| {
                let renamed = parameter_map
                    .get(&k)
                    .cloned()
                    .unwrap_or_else(|| snake_to_camel(&k));
                (renamed, v)
            })
            .collect();
        Value::Object(normalized)
    }

    /// Strip stack traces, hostnames/IPs, ports and raw error codes from a
    /// technical error, translating well-known network failures to short,
    /// speakable sentences. Anything already speakable (no code-like tokens)
    /// is passed through unchanged.
    fn translate_error(tool_name: &str, raw: &str) -> String {
        let lower = raw.to_ascii_lowercase();
        let friendly = if lower.contains("etimedout") || lower.contains("timed out") {
            format!("{tool_name} operation timed out. Please try again later.")
        } else if lower.contains("econnrefused") {
            format!("I couldn't reach {tool_name} right now. Please try again later.")
        } else if lower.contains("enotfound") {
            format!("I couldn't find the service {tool_name} needs. Please try again later.")
        } else if looks_technical(raw) {
            format!("{tool_name} ran into a problem. Please try again later.")
        } else {
            raw.to_string()
        };
        friendly.chars().take(300).collect()
    }

    pub async fn execute(&self, registry: &ToolRegistry, name: &str, args: Value) -> String {
        let Some(tool) = registry.find(name) else {
            log::warn!("tool '{name}' not found, known tools: {:?}", registry.names());
            let known = registry.names().join(", ");
            return format!("Unknown tool '{name}'. Known tools: {known}.");
        };

        let normalized = Self::normalize_args(tool, args);
        let wrapped = serde_json::json!({"input": normalized});

        match tokio::time::timeout(self.timeout, tool.invoke(wrapped)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                log::error!("tool '{name}' failed: {e}");
                Self::translate_error(name, &e.to_string())
            }
            Err(_) => {
                log::error!("tool '{name}' timed out after {:?}", self.timeout);
                format!("{name} operation timed out. Please try again later.")
            }
        }
    }
}

/// Heuristic for "does this look like an internal error a user shouldn't
/// hear verbatim" — IPs, ports, stack-trace markers, error codes.
fn looks_technical(s: &str) -> bool {
    let has_ip = s.split(|c: char| !c.is_ascii_digit() && c != '.').any(|tok| {
        tok.split('.').count() == 4 && tok.split('.').all(|o| o.parse::<u8>().is_ok())
    });
    has_ip
        || s.contains("stack trace")
        || s.contains("panicked at")
        || s.contains("0x")
        || s.to_ascii_uppercase()
            .chars()
            .filter(|c| c.is_ascii_uppercase())
            .count()
            > 6
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool {
        parameter_map: HashMap<String, String>,
    }

    #[async_trait]
    impl ToolDescriptor for EchoTool {
        fn name(&self) -> &str {
            "control_zwave_device"
        }
        fn description(&self) -> &str {
            "control a zwave device"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({})
        }
        fn parameter_map(&self) -> &HashMap<String, String> {
            &self.parameter_map
        }
        async fn invoke(&self, args: Value) -> Result<String, ToolError> {
            Ok(args.to_string())
        }
    }

    fn zwave_tool() -> EchoTool {
        let mut parameter_map = HashMap::new();
        parameter_map.insert("device_name".to_string(), "deviceName".to_string());
        parameter_map.insert("command".to_string(), "action".to_string());
        EchoTool { parameter_map }
    }

    #[tokio::test]
    async fn unknown_tool_lists_known_tools_and_never_panics() {
        let mut registry = ToolRegistry::new();
        registry.add_builtin(Box::new(zwave_tool()));
        let executor = Executor::default();
        let result = executor
            .execute(&registry, "frobnicate", serde_json::json!({}))
            .await;
        assert!(result.contains("Unknown tool"));
        assert!(result.contains("control_zwave_device"));
    }

    #[tokio::test]
    async fn parameter_normalization_maps_explicit_and_falls_back_to_camel_case() {
        let mut registry = ToolRegistry::new();
        registry.add_builtin(Box::new(zwave_tool()));
        let executor = Executor::default();
        let result = executor
            .execute(
                &registry,
                "control_zwave_device",
                serde_json::json!({"device_name": "Switch One", "command": "on", "extra_field": 1}),
            )
            .await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["input"]["deviceName"], "Switch One");
        assert_eq!(parsed["input"]["action"], "on");
        assert_eq!(parsed["input"]["extraField"], 1);
    }

    #[tokio::test]
    async fn tool_timeout_is_translated_to_friendly_message() {
        struct SlowTool;
        #[async_trait]
        impl ToolDescriptor for SlowTool {
            fn name(&self) -> &str {
                "slow_tool"
            }
            fn description(&self) -> &str {
                "never returns in time"
            }
            fn input_schema(&self) -> Value {
                serde_json::json!({})
            }
            async fn invoke(&self, _args: Value) -> Result<String, ToolError> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok("too late".to_string())
            }
        }

        let mut registry = ToolRegistry::new();
        registry.add_builtin(Box::new(SlowTool));
        let executor = Executor::new(Duration::from_millis(20));
        let result = executor
            .execute(&registry, "slow_tool", serde_json::json!({}))
            .await;
        assert!(result.contains("timed out"));
    }

    #[tokio::test]
    async fn external_tool_colliding_with_builtin_name_is_dropped() {
        let mut registry = ToolRegistry::new();
        registry.add_builtin(Box::new(zwave_tool()));
        registry.add_external(vec![Box::new(zwave_tool())]);
        assert_eq!(
            registry.all().iter().filter(|t| t.name() == "control_zwave_device").count(),
            1
        );
    }

    #[test]
    fn snake_to_camel_converts_expected_shapes() {
        assert_eq!(snake_to_camel("device_name"), "deviceName");
        assert_eq!(snake_to_camel("already_camel_ish"), "alreadyCamelIsh");
        assert_eq!(snake_to_camel("single"), "single");
    }

    #[test]
    fn error_translation_strips_ip_addresses() {
        let msg = Executor::translate_error("weather", "connect ECONNREFUSED 10.0.0.5:8080");
        assert!(!msg.contains("10.0.0.5"));
        assert!(msg.len() <= 300);
    }
}
