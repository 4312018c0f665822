//! Wire types shared by the chat backend and the conversation store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Chat request / stream
// ============================================================================

/// One history entry as sent upstream (role + content only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

/// Body of `POST /api/chat/stream`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    pub tools_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub stream: bool,
}

/// Typed representation of one data frame's payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Thinking { content: String },
    Token { content: String, done: bool },
    ToolCall { tool_name: String, arguments: String },
    ToolResult { tool_name: String, result: String },
    Error { content: String },
}

/// Untyped payload as it appears on the wire
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawFrame {
    event: String,
    content: Option<String>,
    tool_name: Option<String>,
    tool_result: Option<String>,
    done: Option<bool>,
}

impl RawFrame {
    /// Classify by the `event` discriminator. Unknown kinds and tool frames
    /// without a `tool_name` yield `None`.
    pub(crate) fn into_event(self) -> Option<StreamEvent> {
        let content = self.content.unwrap_or_default();
        match self.event.as_str() {
            "thinking" => Some(StreamEvent::Thinking { content }),
            "token" => Some(StreamEvent::Token {
                content,
                done: self.done.unwrap_or(false),
            }),
            "tool_call" => Some(StreamEvent::ToolCall {
                tool_name: self.tool_name?,
                arguments: content,
            }),
            "tool_result" => Some(StreamEvent::ToolResult {
                tool_name: self.tool_name?,
                // The backend puts the result text in `tool_result` and leaves
                // `content` empty; older builds used `content`.
                result: self.tool_result.unwrap_or(content),
            }),
            "error" => Some(StreamEvent::Error { content }),
            _ => None,
        }
    }
}

// ============================================================================
// Conversation store
// ============================================================================

/// Entry of the conversation index
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSummary {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().filter(|t| !t.is_empty()).unwrap_or("Untitled")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawConversation {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub updated_at: Option<f64>,
    #[serde(default)]
    pub created_at: Option<f64>,
}

impl From<RawConversation> for ConversationSummary {
    fn from(raw: RawConversation) -> Self {
        let updated_at = raw
            .updated_at
            .or(raw.created_at)
            .map(epoch_seconds_to_utc)
            .unwrap_or_default();
        Self {
            id: raw.id,
            title: raw.title,
            updated_at,
        }
    }
}

/// Response of `POST /api/memory/conversations`
#[derive(Debug, Deserialize)]
pub(crate) struct CreatedConversation {
    pub id: String,
}

/// One persisted message as returned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawStoredMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl RawStoredMessage {
    /// Messages with a role this client does not know are dropped
    pub(crate) fn into_message(self) -> Option<StoredMessage> {
        let role = Role::parse(&self.role)?;
        Some(StoredMessage {
            id: self.id.unwrap_or_default(),
            role,
            content: self.content,
            timestamp: self.timestamp.map(epoch_seconds_to_utc).unwrap_or_default(),
        })
    }
}

/// Response of `GET /api/memory/conversations/{id}`
#[derive(Debug, Deserialize)]
pub(crate) struct RawConversationHistory {
    #[serde(default)]
    pub messages: Vec<RawStoredMessage>,
}

/// The store reports times as fractional seconds since the Unix epoch
#[allow(clippy::cast_possible_truncation)]
pub fn epoch_seconds_to_utc(seconds: f64) -> DateTime<Utc> {
    if !seconds.is_finite() {
        return DateTime::default();
    }
    DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64).unwrap_or_default()
}

// ============================================================================
// Health and catalogs
// ============================================================================

/// Response of `GET /api/health`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub backend: String,
    pub model: String,
    #[serde(default)]
    pub tools_count: usize,
    #[serde(default)]
    pub uptime_seconds: f64,
}

/// Entry of `GET /api/models`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

/// Entry of `GET /api/tools`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}
