//! Chat threads and the local display cache of their messages.
//!
//! The backend owns the history; this is only what the panel shows.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const WELCOME_MESSAGE: &str = "Hi! I can help you find similar fashion items. \
Capture a screen area or upload an image to get started.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Attached image as a data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, image: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatThread {
    pub id: String,
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl ChatThread {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Messages currently displayed for one thread.
#[derive(Debug, Clone)]
pub struct ThreadView {
    thread: ChatThread,
    messages: Vec<ChatMessage>,
}

impl ThreadView {
    pub fn new(thread: ChatThread) -> Self {
        Self {
            thread,
            messages: Vec::new(),
        }
    }

    pub fn thread(&self) -> &ChatThread {
        &self.thread
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Replace the cache with fetched history; empty history shows the
    /// welcome message instead.
    pub fn replace_history(&mut self, messages: Vec<ChatMessage>) {
        if messages.is_empty() {
            self.show_welcome();
        } else {
            self.messages = messages;
        }
    }

    pub fn show_welcome(&mut self) {
        self.messages = vec![ChatMessage::assistant(WELCOME_MESSAGE)];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_message_parses_without_image() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"role":"assistant","content":"hello"}"#).unwrap();
        assert_eq!(msg, ChatMessage::assistant("hello"));
    }

    #[test]
    fn empty_history_shows_welcome() {
        let mut view = ThreadView::new(ChatThread::new("1", "Default"));
        view.push(ChatMessage::user("stale", None));
        view.replace_history(Vec::new());
        assert_eq!(view.messages(), &[ChatMessage::assistant(WELCOME_MESSAGE)]);
    }
}
