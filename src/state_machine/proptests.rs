//! Property-based tests for the turn state machine
//!
//! These drive whole turns through `transition` and apply the effects to a
//! minimal message model, checking the invariants the session relies on.

use super::*;
use crate::backend::StreamEvent;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

/// Just enough of a message to observe effects
#[derive(Debug, Default)]
struct Pending {
    content: String,
    reasoning: String,
    in_progress: bool,
    tool_calls: usize,
    tool_results: usize,
    aborted: bool,
}

impl Pending {
    fn new() -> Self {
        Self {
            in_progress: true,
            ..Self::default()
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::AppendReasoning { text } => {
                assert!(self.in_progress, "reasoning appended to closed message");
                self.reasoning.push_str(&text);
            }
            Effect::AppendContent { text } => {
                assert!(self.in_progress, "content appended to closed message");
                self.content.push_str(&text);
            }
            Effect::Annotate { text } => {
                assert!(self.in_progress, "annotation on closed message");
                self.content.push_str(&text);
            }
            Effect::FinalizeMessage => self.in_progress = false,
            Effect::RecordToolCall { .. } => self.tool_calls += 1,
            Effect::RecordToolResult { .. } => self.tool_results += 1,
            Effect::FailRunningTools { .. } => {}
            Effect::AbortStream => self.aborted = true,
        }
    }
}

/// Run events through the machine, skipping rejected ones like the runner does
fn drive(events: Vec<TurnEvent>) -> (TurnState, Pending) {
    let mut state = TurnState::Idle;
    let mut pending = Pending::new();
    for event in events {
        if let Ok(result) = transition(&state, event) {
            state = result.new_state;
            for effect in result.effects {
                pending.apply(effect);
            }
        }
    }
    (state, pending)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z ]{0,8}"
}

fn arb_content_frame() -> impl Strategy<Value = StreamEvent> {
    prop_oneof![
        arb_text().prop_map(|content| StreamEvent::Thinking { content }),
        arb_text().prop_map(|content| StreamEvent::Token {
            content,
            done: false
        }),
        arb_text().prop_map(|tool_name| StreamEvent::ToolCall {
            tool_name,
            arguments: "{}".to_string()
        }),
        arb_text().prop_map(|tool_name| StreamEvent::ToolResult {
            tool_name,
            result: "ok".to_string()
        }),
    ]
}

fn arb_any_frame() -> impl Strategy<Value = StreamEvent> {
    prop_oneof![
        4 => arb_content_frame(),
        1 => (arb_text(), any::<bool>()).prop_map(|(content, done)| StreamEvent::Token { content, done }),
        1 => arb_text().prop_map(|content| StreamEvent::Error { content }),
    ]
}

fn arb_event() -> impl Strategy<Value = TurnEvent> {
    prop_oneof![
        1 => Just(TurnEvent::Dispatch),
        1 => Just(TurnEvent::ResponseOpened),
        1 => Just(TurnEvent::StreamEnded),
        1 => Just(TurnEvent::CancelRequested),
        1 => arb_text().prop_map(|detail| TurnEvent::TransportFault { detail }),
        1 => (400u16..600, arb_text()).prop_map(|(status, detail)| TurnEvent::ResponseRejected { status, detail }),
        6 => arb_any_frame().prop_map(TurnEvent::Frame),
    ]
}

fn opened() -> Vec<TurnEvent> {
    vec![TurnEvent::Dispatch, TurnEvent::ResponseOpened]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Token payloads received before the final token are concatenated
    /// exactly once, in arrival order.
    #[test]
    fn prop_content_is_token_concatenation(
        tokens in proptest::collection::vec(arb_text(), 0..20),
        last in arb_text(),
    ) {
        let mut events = opened();
        events.extend(tokens.iter().map(|t| TurnEvent::Frame(StreamEvent::Token {
            content: t.clone(),
            done: false,
        })));
        events.push(TurnEvent::Frame(StreamEvent::Token { content: last.clone(), done: true }));
        events.push(TurnEvent::StreamEnded);

        let (state, pending) = drive(events);
        let expected: String = tokens.concat() + &last;
        prop_assert_eq!(state, TurnState::Completed);
        prop_assert_eq!(pending.content, expected);
        prop_assert!(!pending.in_progress);
    }

    /// Interleaved thinking and tool frames never alter content
    #[test]
    fn prop_non_token_frames_leave_content_alone(
        frames in proptest::collection::vec(arb_content_frame(), 0..30),
    ) {
        let expected: String = frames
            .iter()
            .filter_map(|f| match f {
                StreamEvent::Token { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        let mut events = opened();
        events.extend(frames.into_iter().map(TurnEvent::Frame));
        events.push(TurnEvent::StreamEnded);

        let (_, pending) = drive(events);
        prop_assert_eq!(pending.content, expected);
    }

    /// Cancelling an active turn always ends in Cancelled with the message
    /// closed and unannotated, however many frames were applied.
    #[test]
    fn prop_cancel_always_closes(
        frames in proptest::collection::vec(arb_any_frame(), 0..30),
        after in proptest::collection::vec(arb_any_frame(), 0..10),
    ) {
        let mut events = opened();
        events.extend(frames.into_iter().map(TurnEvent::Frame));
        let (before_state, before) = drive(events.clone());
        prop_assume!(before_state.is_active());

        events.push(TurnEvent::CancelRequested);
        events.extend(after.into_iter().map(TurnEvent::Frame));
        events.push(TurnEvent::StreamEnded);

        let (state, pending) = drive(events);
        prop_assert_eq!(state, TurnState::Cancelled);
        prop_assert!(!pending.in_progress);
        prop_assert!(pending.aborted);
        // Nothing after the cancel was applied
        prop_assert_eq!(pending.content, before.content);
        prop_assert_eq!(pending.tool_calls, before.tool_calls);
    }

    /// Any event sequence leaves the message closed once the state is
    /// terminal, and terminal states are absorbing.
    #[test]
    fn prop_terminal_state_closes_message(events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut state = TurnState::Idle;
        let mut pending = Pending::new();
        let mut was_terminal = false;
        for event in events {
            match transition(&state, event) {
                Ok(result) => {
                    prop_assert!(!was_terminal, "terminal state accepted an event");
                    state = result.new_state;
                    for effect in result.effects {
                        pending.apply(effect);
                    }
                }
                Err(_) => {}
            }
            if state.is_terminal() {
                was_terminal = true;
                prop_assert!(!pending.in_progress);
            }
        }
    }

    /// Dispatch is accepted only from Idle
    #[test]
    fn prop_single_flight(events in proptest::collection::vec(arb_event(), 0..20)) {
        let mut state = TurnState::Idle;
        for event in events {
            let is_dispatch = event == TurnEvent::Dispatch;
            let from_idle = state == TurnState::Idle;
            match transition(&state, event) {
                Ok(result) => {
                    if is_dispatch {
                        prop_assert!(from_idle);
                    }
                    state = result.new_state;
                }
                Err(_) => {
                    if is_dispatch {
                        prop_assert!(!from_idle);
                    }
                }
            }
        }
    }
}
