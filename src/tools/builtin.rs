//! Built-in tools available regardless of MCP discovery.
//!
//! Grounded on the teacher's `quick_actions::get_time`/`calculate_future_time`
//! free functions, reshaped into [`ToolDescriptor`] impls so they sit in the
//! same registry as MCP-discovered tools.

use super::{ToolDescriptor, ToolError};
use async_trait::async_trait;
use chrono::Local;
use serde_json::Value;

/// Reports the current local date and time. Voice assistants get asked this
/// constantly and it should never depend on a flaky external tool server.
pub struct CurrentDateTime;

#[async_trait]
impl ToolDescriptor for CurrentDateTime {
    fn name(&self) -> &str {
        "get_current_datetime"
    }

    fn description(&self) -> &str {
        "Get the current local date and time."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
        })
    }

    async fn invoke(&self, _args: Value) -> Result<String, ToolError> {
        let now = Local::now();
        let time_str = now.format("%I:%M %p").to_string();
        let time_str = time_str.trim_start_matches('0').to_string();
        let date_str = now.format("%A, %B %-d").to_string();
        Ok(format!("It's {time_str} on {date_str}."))
    }
}

/// Fallback for "control_zwave_device": only registered when MCP discovery
/// did not surface a tool of that name, so the assistant can still give a
/// sane spoken answer instead of "unknown tool" when the home-automation
/// MCP server is unreachable.
pub struct ZwaveDeviceFallback;

#[async_trait]
impl ToolDescriptor for ZwaveDeviceFallback {
    fn name(&self) -> &str {
        "control_zwave_device"
    }

    fn description(&self) -> &str {
        "Control a Z-Wave device by name (fallback when home automation tools are unavailable)."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "deviceName": {"type": "string"},
                "action": {"type": "string"},
            },
            "required": ["deviceName", "action"],
        })
    }

    async fn invoke(&self, _args: Value) -> Result<String, ToolError> {
        Ok("I can't reach the home automation system right now, so I couldn't do that.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn current_datetime_trims_leading_zero_and_mentions_period() {
        let tool = CurrentDateTime;
        let result = tool.invoke(serde_json::json!({})).await.unwrap();
        assert!(result.starts_with("It's "));
        assert!(result.contains("AM") || result.contains("PM"));
        assert!(!result.contains("It's 0"));
    }

    #[tokio::test]
    async fn zwave_fallback_gives_a_speakable_unavailable_message() {
        let tool = ZwaveDeviceFallback;
        let result = tool
            .invoke(serde_json::json!({"deviceName": "Lamp", "action": "on"}))
            .await
            .unwrap();
        assert!(result.len() < 300);
        assert!(!result.is_empty());
    }
}
