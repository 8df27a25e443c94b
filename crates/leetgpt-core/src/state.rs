//! Context-agnostic conversation types
//!
//! These are shared by the page agent, the popup and the wire protocol, and
//! don't depend on any specific front-end.

use serde::{Deserialize, Serialize};

/// A chat message as displayed and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    #[serde(rename = "isUser")]
    pub is_user: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_user: true,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_user: false,
        }
    }

    pub fn role(&self) -> ChatRole {
        if self.is_user {
            ChatRole::User
        } else {
            ChatRole::Assistant
        }
    }
}

/// The role of a message sender on the completion API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// Snapshot of the problem currently shown on the page.
///
/// Fields are empty strings when the page didn't expose them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemContext {
    pub title: String,
    pub description: String,
    pub current_code: String,
}

impl ProblemContext {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.description.is_empty() && self.current_code.is_empty()
    }
}
