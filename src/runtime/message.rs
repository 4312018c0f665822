//! Local message model

use crate::backend::{Role, StoredMessage, WireMessage};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A message in the local transcript
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Model reasoning, kept apart from the answer and never sent upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Indices into the session's tool-call tracker, in arrival order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<usize>,
    pub in_progress: bool,
}

impl Message {
    fn new(role: Role, content: String, in_progress: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            created_at: Utc::now(),
            reasoning: None,
            tool_calls: Vec::new(),
            in_progress,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into(), false)
    }

    /// Empty assistant message that a turn streams into
    pub fn pending_assistant() -> Self {
        Self::new(Role::Assistant, String::new(), true)
    }

    pub fn from_stored(stored: StoredMessage) -> Self {
        Self {
            id: stored.id,
            role: stored.role,
            content: stored.content,
            created_at: stored.timestamp,
            reasoning: None,
            tool_calls: Vec::new(),
            in_progress: false,
        }
    }

    /// Upstream form: role and content only
    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }

    pub fn append_content(&mut self, text: &str) -> bool {
        if !self.in_progress {
            return false;
        }
        self.content.push_str(text);
        true
    }

    pub fn append_reasoning(&mut self, text: &str) -> bool {
        if !self.in_progress {
            return false;
        }
        self.reasoning.get_or_insert_with(String::new).push_str(text);
        true
    }

    /// Append a notice on its own paragraph
    pub fn annotate(&mut self, notice: &str) -> bool {
        if !self.in_progress {
            return false;
        }
        if !self.content.is_empty() {
            self.content.push_str("\n\n");
        }
        self.content.push_str(notice);
        true
    }

    pub fn finalize(&mut self) {
        self.in_progress = false;
    }
}
