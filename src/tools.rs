//! Tool-call lifecycle tracking
//!
//! Tools run on the backend; this side only observes the `tool_call` and
//! `tool_result` events reported in the stream and keeps a display record.

#[cfg(test)]
mod proptests;

use serde::Serialize;
use serde_json::{Map, Value};

/// Lifecycle of one invocation. Ordered: a status never moves to an
/// earlier variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl ToolStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, ToolStatus::Done | ToolStatus::Error)
    }

    fn rank(self) -> u8 {
        match self {
            ToolStatus::Pending => 0,
            ToolStatus::Running => 1,
            // Done and Error are both final
            ToolStatus::Done | ToolStatus::Error => 2,
        }
    }
}

/// A tool invocation observed in the stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub result: Option<String>,
    pub status: ToolStatus,
}

impl ToolCall {
    /// Move to `next` if that is a forward step. Returns whether it moved.
    fn advance(&mut self, next: ToolStatus) -> bool {
        if next.rank() > self.status.rank() {
            self.status = next;
            true
        } else {
            false
        }
    }
}

/// Parse a `tool_call` argument payload. Anything that is not a JSON object
/// counts as no arguments.
pub fn parse_arguments(payload: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Append-only record of every tool call seen during the session
#[derive(Debug, Clone, Default)]
pub struct ToolCallTracker {
    calls: Vec<ToolCall>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new running invocation; returns its index
    pub fn on_tool_call(&mut self, name: &str, arguments: &str) -> usize {
        self.calls.push(ToolCall {
            name: name.to_string(),
            arguments: parse_arguments(arguments),
            result: None,
            status: ToolStatus::Running,
        });
        self.calls.len() - 1
    }

    /// Attach a result to the most recent running invocation of `name`.
    ///
    /// Returns the index of the entry that was completed, or `None` when no
    /// invocation of that name is running (the result is dropped).
    pub fn on_tool_result(&mut self, name: &str, result: &str) -> Option<usize> {
        let index = self
            .calls
            .iter()
            .rposition(|c| c.name == name && c.status == ToolStatus::Running)?;
        let call = &mut self.calls[index];
        call.advance(ToolStatus::Done);
        call.result = Some(result.to_string());
        Some(index)
    }

    /// Fail a still-running invocation. Finished entries are left alone.
    pub fn mark_error(&mut self, index: usize, message: &str) -> bool {
        let Some(call) = self.calls.get_mut(index) else {
            return false;
        };
        if call.status.is_finished() {
            return false;
        }
        call.advance(ToolStatus::Error);
        call.result = Some(message.to_string());
        true
    }

    pub fn get(&self, index: usize) -> Option<&ToolCall> {
        self.calls.get(index)
    }

    pub fn calls(&self) -> &[ToolCall] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }
}
