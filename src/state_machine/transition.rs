//! Pure state transition function
//!
//! Given the same state and event this always produces the same result and
//! performs no I/O. The runner applies the returned effects.

use super::effect::{error_annotation, fault_annotation, rejected_annotation};
use super::{Effect, TurnEvent, TurnState};
use crate::backend::StreamEvent;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A turn is already in progress")]
    TurnActive,
    #[error("Turn has already finished")]
    TurnFinished,
    #[error("No turn in progress")]
    NothingToCancel,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

pub fn transition(state: &TurnState, event: TurnEvent) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // Anything arriving after the end is discarded by the caller
        (s, _) if s.is_terminal() => Err(TransitionError::TurnFinished),

        // ============================================================
        // Dispatch
        // ============================================================
        (TurnState::Idle, TurnEvent::Dispatch) => Ok(TransitionResult::new(TurnState::Sending)),

        (TurnState::Idle, TurnEvent::CancelRequested) => Err(TransitionError::NothingToCancel),

        (TurnState::Idle, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} before dispatch"
        ))),

        (_, TurnEvent::Dispatch) => Err(TransitionError::TurnActive),

        // ============================================================
        // Response head
        // ============================================================
        (TurnState::Sending, TurnEvent::ResponseOpened) => {
            Ok(TransitionResult::new(TurnState::Streaming { message_open: true }))
        }

        (TurnState::Sending, TurnEvent::ResponseRejected { status, detail }) => {
            let detail = if detail.is_empty() {
                format!("HTTP {status}")
            } else {
                detail
            };
            Ok(TransitionResult::new(TurnState::Failed {
                detail: detail.clone(),
            })
            .with_effect(Effect::annotate(rejected_annotation(&detail)))
            .with_effect(Effect::FinalizeMessage))
        }

        // ============================================================
        // Transport faults
        // ============================================================
        (TurnState::Sending, TurnEvent::TransportFault { detail }) => {
            Ok(TransitionResult::new(TurnState::Failed {
                detail: detail.clone(),
            })
            .with_effect(Effect::annotate(fault_annotation(&detail)))
            .with_effect(Effect::FinalizeMessage))
        }

        (TurnState::Streaming { message_open }, TurnEvent::TransportFault { detail }) => {
            let mut result = TransitionResult::new(TurnState::Failed {
                detail: detail.clone(),
            })
            .with_effect(Effect::FailRunningTools {
                detail: detail.clone(),
            });
            // A message already closed by its final token stays as it is
            if *message_open {
                result = result.with_effects([
                    Effect::annotate(fault_annotation(&detail)),
                    Effect::FinalizeMessage,
                ]);
            }
            Ok(result)
        }

        // ============================================================
        // Frames
        // ============================================================
        (TurnState::Streaming { message_open }, TurnEvent::Frame(frame)) => {
            Ok(apply_frame(*message_open, frame))
        }

        (TurnState::Streaming { message_open }, TurnEvent::StreamEnded) => {
            let result = TransitionResult::new(TurnState::Completed);
            if *message_open {
                Ok(result.with_effect(Effect::FinalizeMessage))
            } else {
                Ok(result)
            }
        }

        // ============================================================
        // Cancellation
        // ============================================================
        (TurnState::Sending, TurnEvent::CancelRequested) => {
            Ok(TransitionResult::new(TurnState::Cancelled)
                .with_effect(Effect::AbortStream)
                .with_effect(Effect::FinalizeMessage))
        }

        (TurnState::Streaming { message_open }, TurnEvent::CancelRequested) => {
            let result =
                TransitionResult::new(TurnState::Cancelled).with_effect(Effect::AbortStream);
            if *message_open {
                Ok(result.with_effect(Effect::FinalizeMessage))
            } else {
                Ok(result)
            }
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in state {}",
            state.name()
        ))),
    }
}

/// Apply one decoded frame while streaming
fn apply_frame(message_open: bool, frame: StreamEvent) -> TransitionResult {
    let streaming = |open| TurnState::Streaming { message_open: open };

    match frame {
        StreamEvent::Thinking { content } if message_open && !content.is_empty() => {
            TransitionResult::new(streaming(true))
                .with_effect(Effect::AppendReasoning { text: content })
        }

        StreamEvent::Token { content, done } if message_open => {
            let mut result = TransitionResult::new(streaming(!done));
            if !content.is_empty() {
                result = result.with_effect(Effect::AppendContent { text: content });
            }
            if done {
                result = result.with_effect(Effect::FinalizeMessage);
            }
            result
        }

        StreamEvent::Error { content } if message_open => TransitionResult::new(streaming(false))
            .with_effect(Effect::annotate(error_annotation(&content)))
            .with_effect(Effect::FinalizeMessage),

        // Tool events never touch message content, so they are forwarded
        // whether or not the message is still open
        StreamEvent::ToolCall {
            tool_name,
            arguments,
        } => TransitionResult::new(streaming(message_open)).with_effect(Effect::RecordToolCall {
            name: tool_name,
            arguments,
        }),

        StreamEvent::ToolResult { tool_name, result } => {
            TransitionResult::new(streaming(message_open)).with_effect(Effect::RecordToolResult {
                name: tool_name,
                result,
            })
        }

        // Content frames after the message was closed, or empty thinking
        _ => TransitionResult::new(streaming(message_open)),
    }
}
