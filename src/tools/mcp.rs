//! Model Context Protocol client: spawns a configured stdio subprocess,
//! discovers its tools over JSON-RPC, and wraps each discovered tool as a
//! [`ToolDescriptor`] so the rest of the crate never has to know a tool came
//! from MCP rather than being built in.
//!
//! Connection is retried with exponential backoff per `McpConfig`; failure
//! after the retry budget is non-fatal — the caller proceeds with built-ins
//! only, per the startup sequence's "tools are best-effort" design.

use super::{ToolDescriptor, ToolError};
use crate::config::McpConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

#[derive(Error, Debug, Clone)]
pub enum McpError {
    #[error("failed to spawn MCP server '{0}': {1}")]
    Spawn(String, String),

    #[error("MCP server '{0}' closed its stdout unexpectedly")]
    Closed(String),

    #[error("MCP transport error: {0}")]
    Transport(String),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP server returned an error response: {0}")]
    RemoteError(String),
}

/// A single JSON-RPC request/response exchange over the child's stdio.
struct McpTransport {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: AtomicI64,
}

impl McpTransport {
    async fn call(&mut self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut line = serde_json::to_string(&request)
            .map_err(|e| McpError::Protocol(e.to_string()))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let mut response_line = String::new();
        loop {
            response_line.clear();
            let bytes_read = self
                .stdout
                .read_line(&mut response_line)
                .await
                .map_err(|e| McpError::Transport(e.to_string()))?;
            if bytes_read == 0 {
                return Err(McpError::Closed("stdout".to_string()));
            }
            if response_line.trim().is_empty() {
                continue;
            }
            let parsed: Value = serde_json::from_str(&response_line)
                .map_err(|e| McpError::Protocol(e.to_string()))?;
            if parsed.get("id").and_then(Value::as_i64) != Some(id) {
                continue;
            }
            if let Some(error) = parsed.get("error") {
                return Err(McpError::RemoteError(error.to_string()));
            }
            return Ok(parsed.get("result").cloned().unwrap_or(Value::Null));
        }
    }
}

/// A tool surfaced by an MCP server, invoked by re-issuing `tools/call` over
/// the same subprocess each time.
pub struct McpToolDescriptor {
    name: String,
    description: String,
    input_schema: Value,
    transport: std::sync::Arc<Mutex<McpTransport>>,
}

#[async_trait]
impl ToolDescriptor for McpToolDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let mut transport = self.transport.lock().await;
        let result = transport
            .call(
                "tools/call",
                serde_json::json!({"name": self.name, "arguments": args}),
            )
            .await
            .map_err(|e| ToolError::Failed(self.name.clone(), e.to_string()))?;

        if let Some(text) = result
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| blocks.first())
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str)
        {
            Ok(text.to_string())
        } else {
            Ok(result.to_string())
        }
    }
}

/// Owns the MCP subprocess so it stays alive for as long as its discovered
/// tools are in use; killed on drop.
pub struct McpClient {
    _child: Child,
}

/// Spawn the configured MCP server, discover its tools, and wrap each as a
/// [`ToolDescriptor`]. Retries the spawn-and-discover sequence with
/// exponential backoff per `config.retry_attempts`; returns an empty vec
/// (never an error) once the budget is exhausted so the caller can fall
/// back to built-ins without special-casing failure.
pub async fn discover_tools(config: &McpConfig) -> (Vec<Box<dyn ToolDescriptor>>, Option<McpClient>) {
    let mut delay = config.retry_base_delay();
    for attempt in 1..=config.retry_attempts.max(1) {
        match spawn_and_discover(config).await {
            Ok((tools, client)) => return (tools, Some(client)),
            Err(e) => {
                log::warn!(
                    "MCP discovery attempt {attempt}/{} failed: {e}",
                    config.retry_attempts
                );
                if attempt < config.retry_attempts {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    log::error!(
        "MCP connection failed after {} attempts, proceeding with built-in tools only",
        config.retry_attempts
    );
    (Vec::new(), None)
}

async fn spawn_and_discover(
    config: &McpConfig,
) -> Result<(Vec<Box<dyn ToolDescriptor>>, McpClient), McpError> {
    let mut command = Command::new(&config.command);
    command
        .args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| McpError::Spawn(config.command.clone(), e.to_string()))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| McpError::Spawn(config.command.clone(), "no stdin handle".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| McpError::Spawn(config.command.clone(), "no stdout handle".to_string()))?;

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            while let Ok(n) = reader.read_line(&mut line).await {
                if n == 0 {
                    break;
                }
                log::debug!("mcp server stderr: {}", line.trim_end());
                line.clear();
            }
        });
    }

    let mut transport = McpTransport {
        stdin,
        stdout: BufReader::new(stdout),
        next_id: AtomicI64::new(1),
    };

    transport
        .call(
            "initialize",
            serde_json::json!({"protocolVersion": "2024-11-05"}),
        )
        .await?;

    let result = transport.call("tools/list", serde_json::json!({})).await?;
    let raw_tools = result
        .get("tools")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let transport = std::sync::Arc::new(Mutex::new(transport));
    let mut tools: Vec<Box<dyn ToolDescriptor>> = Vec::with_capacity(raw_tools.len());
    for raw in raw_tools {
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::Protocol("tool missing 'name'".to_string()))?
            .to_string();
        let description = raw
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let input_schema = raw
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}}));
        tools.push(Box::new(McpToolDescriptor {
            name,
            description,
            input_schema,
            transport: transport.clone(),
        }));
    }

    Ok((tools, McpClient { _child: child }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn retry_base_delay_defaults_to_one_second() {
        let config = McpConfig {
            command: "true".to_string(),
            args: vec![],
            retry_attempts: 2,
            retry_base_delay_ms: 1000,
        };
        assert_eq!(config.retry_base_delay(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn discover_tools_falls_back_to_empty_when_command_missing() {
        let config = McpConfig {
            command: "definitely-not-a-real-binary-xyz".to_string(),
            args: vec![],
            retry_attempts: 2,
            retry_base_delay_ms: 1,
        };
        let (tools, client) = discover_tools(&config).await;
        assert!(tools.is_empty());
        assert!(client.is_none());
    }
}
