//! Conversation context: a bounded window of recent messages handed to the
//! LLM backend on every turn.
//!
//! Grounded on the teacher's `ConversationContext`, minus its JSON
//! persistence (`to_json`/`from_json`) — this gateway keeps no conversation
//! history across restarts.

use super::client::{Message, Role};
use std::collections::VecDeque;

const DEFAULT_MAX_MESSAGES: usize = 20;
/// Rough chars-per-token ratio for English text, used only to decide when
/// to trim further than the message-count cap already does.
const CHARS_PER_TOKEN_ESTIMATE: usize = 4;

pub struct ConversationContext {
    messages: VecDeque<Message>,
    max_messages: usize,
    max_tokens_estimate: usize,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES, 4000)
    }
}

impl ConversationContext {
    pub fn new(max_messages: usize, max_tokens_estimate: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_messages,
            max_tokens_estimate,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
        self.trim();
    }

    /// Drop oldest messages past the count cap, then (if the estimated
    /// token count of what remains still exceeds the budget) keep dropping
    /// the oldest until it fits. The system prompt is supplied separately
    /// by the router and never stored here.
    fn trim(&mut self) {
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
        while self.estimated_tokens() > self.max_tokens_estimate && self.messages.len() > 1 {
            self.messages.pop_front();
        }
    }

    fn estimated_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| m.content.len() / CHARS_PER_TOKEN_ESTIMATE)
            .sum()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Build the full message list to send to a backend: system prompt
    /// first, then the retained conversation history.
    pub fn to_request(&self, system_prompt: &str) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.push(Message::system(system_prompt));
        out.extend(self.messages.iter().cloned());
        out
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_beyond_max_messages_drops_oldest() {
        let mut ctx = ConversationContext::new(2, 100_000);
        ctx.push(Message::user("one"));
        ctx.push(Message::user("two"));
        ctx.push(Message::user("three"));
        let contents: Vec<&str> = ctx.messages().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three"]);
    }

    #[test]
    fn push_beyond_token_estimate_drops_oldest_even_under_count_cap() {
        let mut ctx = ConversationContext::new(10, 5);
        ctx.push(Message::user("a".repeat(100)));
        ctx.push(Message::user("short"));
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.messages().next().unwrap().content, "short");
    }

    #[test]
    fn to_request_prepends_system_prompt() {
        let mut ctx = ConversationContext::default();
        ctx.push(Message::user("hello"));
        let request = ctx.to_request("you are a helper");
        assert_eq!(request[0].role, Role::System);
        assert_eq!(request[0].content, "you are a helper");
        assert_eq!(request[1].content, "hello");
    }

    #[test]
    fn clear_empties_the_window() {
        let mut ctx = ConversationContext::default();
        ctx.push(Message::user("hello"));
        ctx.clear();
        assert!(ctx.is_empty());
    }
}
