//! Effects produced by state transitions

/// Effects to be applied after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append to the pending message's reasoning text
    AppendReasoning { text: String },

    /// Append to the pending message's content
    AppendContent { text: String },

    /// Append a notice to the content, separated from what is already there
    Annotate { text: String },

    /// Clear the pending message's in-progress flag
    FinalizeMessage,

    /// Forward a `tool_call` to the tracker
    RecordToolCall { name: String, arguments: String },

    /// Forward a `tool_result` to the tracker
    RecordToolResult { name: String, result: String },

    /// Fail the turn's tool calls that are still running
    FailRunningTools { detail: String },

    /// Abort the in-flight network operation
    AbortStream,
}

impl Effect {
    pub fn annotate(text: impl Into<String>) -> Self {
        Effect::Annotate { text: text.into() }
    }
}

/// Notice appended when the backend reports an error event
pub fn error_annotation(content: &str) -> String {
    format!("Error: {content}")
}

/// Notice used when the backend rejects the request
pub fn rejected_annotation(detail: &str) -> String {
    format!("Request failed: {detail}")
}

/// Notice appended when the stream breaks off
pub fn fault_annotation(detail: &str) -> String {
    format!("Connection lost: {detail}")
}
