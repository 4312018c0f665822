//! Turn state types

use serde::Serialize;

/// State of one conversational turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnState {
    /// No request dispatched yet; the only state a turn can start from
    #[default]
    Idle,

    /// Request dispatched, waiting for the response head
    Sending,

    /// Response body available, applying frames
    Streaming {
        /// Whether the pending message still accepts content. Cleared by a
        /// final token or an error event; the stream itself keeps going.
        message_open: bool,
    },

    /// Frame sequence ended normally
    Completed,

    /// User cancelled; later frames are discarded
    Cancelled,

    /// Request rejected or transport fault
    Failed { detail: String },
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnState::Completed | TurnState::Cancelled | TurnState::Failed { .. }
        )
    }

    /// Dispatched and not yet terminal
    pub fn is_active(&self) -> bool {
        matches!(self, TurnState::Sending | TurnState::Streaming { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Sending => "sending",
            TurnState::Streaming { .. } => "streaming",
            TurnState::Completed => "completed",
            TurnState::Cancelled => "cancelled",
            TurnState::Failed { .. } => "failed",
        }
    }

    /// Outcome for a terminal state
    pub fn outcome(&self) -> Option<TurnOutcome> {
        match self {
            TurnState::Completed => Some(TurnOutcome::Completed),
            TurnState::Cancelled => Some(TurnOutcome::Cancelled),
            TurnState::Failed { detail } => Some(TurnOutcome::Failed {
                detail: detail.clone(),
            }),
            _ => None,
        }
    }
}

/// How a finished turn ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed,
    Cancelled,
    Failed { detail: String },
}
