//! UI-agnostic chat log types
//!
//! The chat log is what the user sees. It is separate from the session
//! transcript: notices and errors show up here but are never sent to the
//! model.

use serde::{Deserialize, Serialize};

/// One entry in the visible conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Model that produced an assistant reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Who a chat log entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    User,
    Assistant,
    Notice,
    Error,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            model: None,
        }
    }

    pub fn assistant(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            model: Some(model.into()),
        }
    }

    pub fn notice(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Notice,
            content: content.into(),
            model: None,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Error,
            content: content.into(),
            model: None,
        }
    }

    /// Label shown above the message body
    pub fn label(&self) -> String {
        match (self.role, &self.model) {
            (ChatRole::User, _) => "You:".to_string(),
            (ChatRole::Assistant, Some(model)) => format!("AI ({}):", model),
            (ChatRole::Assistant, None) => "AI:".to_string(),
            (ChatRole::Notice, _) => "*".to_string(),
            (ChatRole::Error, _) => "!".to_string(),
        }
    }
}
