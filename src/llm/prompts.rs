//! System prompt construction for the AI router: a base prompt plus
//! intent-driven hint paragraphs, assembled with a small builder so the
//! pieces stay readable and independently testable.

use crate::intent::Intent;

pub struct SystemPrompts;

impl SystemPrompts {
    /// Default prompt used when no custom prompt is configured.
    pub fn default_home_automation_assistant() -> &'static str {
        "You are a voice assistant for a home automation gateway. \
         Keep responses conversational, concise, and appropriate for speech. \
         Avoid markdown, bullet points, or long lists. \
         Keep responses under 100 words unless more detail is specifically requested."
    }

    /// Appended for backends (typically local reasoning models) known to
    /// leak `<think>...</think>` scratch reasoning into their output.
    pub fn suppress_think_tags() -> &'static str {
        "Do NOT use <think> tags."
    }

    pub fn device_query_hint() -> &'static str {
        "The user may be asking about devices in their home. You have tools to list \
         known devices and to turn devices on or off, dim them, or brighten them. \
         Use them when the request requires current device state or a device action; \
         do not guess a device's state."
    }

    pub fn datetime_query_hint() -> &'static str {
        "The user may be asking for the current date or time. Use the get_current_datetime \
         tool rather than guessing; do not attempt to compute it yourself."
    }
}

/// Assembles a system prompt from a base prompt plus any number of
/// hint/constraint paragraphs, in the order added, joined as separate
/// paragraphs.
pub struct PromptBuilder {
    parts: Vec<String>,
}

impl PromptBuilder {
    pub fn new(base_prompt: impl Into<String>) -> Self {
        Self {
            parts: vec![base_prompt.into()],
        }
    }

    pub fn add_paragraph(mut self, paragraph: impl Into<String>) -> Self {
        self.parts.push(paragraph.into());
        self
    }

    pub fn add_if(mut self, condition: bool, paragraph: impl Into<String>) -> Self {
        if condition {
            self.parts.push(paragraph.into());
        }
        self
    }

    pub fn build(self) -> String {
        self.parts.join("\n\n")
    }
}

/// Build the full system prompt for one turn: base prompt (configured or
/// default), `<think>`-tag suppression for backends that need it, and
/// intent-driven hint paragraphs appended as separate paragraphs in a fixed
/// order (device query, then datetime query) so prompt text is stable
/// across calls with the same inputs.
pub fn build_system_prompt(
    configured_base: Option<&str>,
    suppress_think_tags: bool,
    intent: &Intent,
) -> String {
    let base = configured_base.unwrap_or(SystemPrompts::default_home_automation_assistant());
    PromptBuilder::new(base)
        .add_if(suppress_think_tags, SystemPrompts::suppress_think_tags())
        .add_if(intent.is_device_query || intent.is_device_control_query, SystemPrompts::device_query_hint())
        .add_if(intent.is_datetime_query, SystemPrompts::datetime_query_hint())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_used_when_no_base_configured() {
        let intent = Intent::default();
        let prompt = build_system_prompt(None, false, &intent);
        assert!(prompt.contains("home automation"));
        assert!(!prompt.contains("<think>"));
    }

    #[test]
    fn configured_base_prompt_overrides_default() {
        let intent = Intent::default();
        let prompt = build_system_prompt(Some("custom base"), false, &intent);
        assert!(prompt.starts_with("custom base"));
    }

    #[test]
    fn device_query_intent_appends_device_hint_paragraph() {
        let intent = Intent {
            is_device_query: true,
            ..Intent::default()
        };
        let prompt = build_system_prompt(None, false, &intent);
        assert!(prompt.contains("devices in their home"));
    }

    #[test]
    fn datetime_intent_appends_datetime_hint_paragraph() {
        let intent = Intent {
            is_datetime_query: true,
            ..Intent::default()
        };
        let prompt = build_system_prompt(None, false, &intent);
        assert!(prompt.contains("get_current_datetime"));
    }

    #[test]
    fn suppress_think_tags_flag_appends_instruction() {
        let intent = Intent::default();
        let prompt = build_system_prompt(None, true, &intent);
        assert!(prompt.contains("Do NOT use <think> tags"));
    }

    #[test]
    fn hints_are_independent_and_can_combine() {
        let intent = Intent {
            is_device_query: true,
            is_datetime_query: true,
            ..Intent::default()
        };
        let prompt = build_system_prompt(None, false, &intent);
        assert!(prompt.contains("devices in their home"));
        assert!(prompt.contains("get_current_datetime"));
    }
}
