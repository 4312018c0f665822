//! Session controller
//!
//! Owns conversation identity, the local transcript and the single-flight
//! turn slot. Turns run as spawned tasks that report back through
//! [`Shared::apply`]; nothing else mutates the pending message or the tool
//! tracker.

use super::message::Message;
use super::turn;
use crate::backend::{BackendError, ChatBackend, ChatRequest, ConversationStore, ConversationSummary, Role};
use crate::location::SessionLocation;
use crate::state_machine::{transition, Effect, TurnEvent, TurnOutcome, TurnState};
use crate::tools::{ToolCall, ToolCallTracker};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Longest conversation title derived from the first utterance
pub const MAX_TITLE_CHARS: usize = 50;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Per-session request options
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub tools_enabled: bool,
    /// Model override sent with each request
    pub model: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tools_enabled: true,
            model: None,
        }
    }
}

/// Notifications for whatever renders the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ReasoningDelta {
        text: String,
    },
    ContentDelta {
        text: String,
    },
    /// Error or failure notice appended to the pending message
    Annotation {
        text: String,
    },
    ToolCallStarted {
        index: usize,
        name: String,
        arguments: Map<String, Value>,
    },
    ToolCallFinished {
        index: usize,
        name: String,
        result: String,
    },
    TurnFinished {
        outcome: TurnOutcome,
    },
    ConversationChanged {
        id: Option<String>,
    },
    ConversationsRefreshed {
        count: usize,
    },
}

/// Point-in-time copy of the session state
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub active_conversation: Option<String>,
    pub messages: Vec<Message>,
    pub tool_calls: Vec<ToolCall>,
    pub conversations: Vec<ConversationSummary>,
    pub turn_state: TurnState,
    pub last_outcome: Option<TurnOutcome>,
}

/// The turn currently holding the single-flight slot
struct ActiveTurn {
    id: u64,
    state: TurnState,
    /// Index of the pending assistant message; unset until dispatch
    message_index: Option<usize>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SessionState {
    active_conversation: Option<String>,
    messages: Vec<Message>,
    tools: ToolCallTracker,
    conversations: Vec<ConversationSummary>,
    turn: Option<ActiveTurn>,
    last_outcome: Option<TurnOutcome>,
    next_turn_id: u64,
}

impl SessionState {
    fn owns_slot(&self, turn_id: u64) -> bool {
        self.turn.as_ref().is_some_and(|t| t.id == turn_id)
    }

    /// Cancel whatever holds the slot and release it
    fn cancel_turn(&mut self) -> Vec<SessionEvent> {
        let Some(turn) = self.turn.as_ref() else {
            return Vec::new();
        };
        let turn_id = turn.id;
        let token = turn.cancel.clone();
        if turn.state == TurnState::Idle {
            // Reserved by a send that has not dispatched yet
            token.cancel();
            self.turn = None;
            tracing::debug!(turn_id, "Released undispatched turn");
            return Vec::new();
        }
        self.step(turn_id, TurnEvent::CancelRequested)
            .map(|(_, events)| events)
            .unwrap_or_default()
    }

    /// Feed one event to the turn's state machine and apply the effects.
    ///
    /// Returns `None` when the event was rejected; otherwise the new state
    /// and the notifications to broadcast once the lock is released.
    fn step(&mut self, turn_id: u64, event: TurnEvent) -> Option<(TurnState, Vec<SessionEvent>)> {
        let turn = self.turn.as_mut().filter(|t| t.id == turn_id)?;
        let result = match transition(&turn.state, event) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(turn_id, error = %e, "Discarding turn event");
                return None;
            }
        };

        tracing::debug!(
            turn_id,
            from = turn.state.name(),
            to = result.new_state.name(),
            "Turn transition"
        );
        turn.state = result.new_state.clone();
        let message_index = turn.message_index;
        let cancel = turn.cancel.clone();

        let mut events = Vec::new();
        for effect in result.effects {
            if effect == Effect::AbortStream {
                cancel.cancel();
                continue;
            }
            if let Some(index) = message_index {
                events.extend(self.apply_effect(index, effect));
            }
        }

        if let Some(outcome) = result.new_state.outcome() {
            self.turn = None;
            self.last_outcome = Some(outcome.clone());
            tracing::info!(turn_id, outcome = ?outcome, "Turn finished");
            events.push(SessionEvent::TurnFinished { outcome });
        }
        Some((result.new_state, events))
    }

    fn apply_effect(&mut self, message_index: usize, effect: Effect) -> Option<SessionEvent> {
        let message = self.messages.get_mut(message_index)?;
        match effect {
            Effect::AppendReasoning { text } => message
                .append_reasoning(&text)
                .then_some(SessionEvent::ReasoningDelta { text }),
            Effect::AppendContent { text } => message
                .append_content(&text)
                .then_some(SessionEvent::ContentDelta { text }),
            Effect::Annotate { text } => message
                .annotate(&text)
                .then_some(SessionEvent::Annotation { text }),
            Effect::FinalizeMessage => {
                message.finalize();
                None
            }
            Effect::RecordToolCall { name, arguments } => {
                let index = self.tools.on_tool_call(&name, &arguments);
                message.tool_calls.push(index);
                tracing::debug!(tool = %name, index, total = self.tools.len(), "Tool call started");
                let arguments = self.tools.get(index).map(|c| c.arguments.clone())?;
                Some(SessionEvent::ToolCallStarted {
                    index,
                    name,
                    arguments,
                })
            }
            Effect::RecordToolResult { name, result } => {
                if let Some(index) = self.tools.on_tool_result(&name, &result) {
                    Some(SessionEvent::ToolCallFinished {
                        index,
                        name,
                        result,
                    })
                } else {
                    tracing::debug!(tool = %name, "Dropping result with no running call");
                    None
                }
            }
            Effect::FailRunningTools { detail } => {
                for index in message.tool_calls.clone() {
                    self.tools.mark_error(index, &detail);
                }
                None
            }
            Effect::AbortStream => None,
        }
    }

    fn reset_transcript(&mut self, conversation: Option<String>, messages: Vec<Message>) {
        self.active_conversation = conversation;
        self.messages = messages;
    }
}

/// What a turn task learns from applying one event
pub(super) enum Step {
    Continue,
    Finished(TurnOutcome),
}

/// State shared between the controller and its turn tasks
pub(super) struct Shared<B, S> {
    pub(super) backend: B,
    store: S,
    settings: SessionSettings,
    location: Option<SessionLocation>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl<B, S> Shared<B, S>
where
    B: ChatBackend,
    S: ConversationStore,
{
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, events: Vec<SessionEvent>) {
        for event in events {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    /// Apply an event on behalf of turn `turn_id`.
    ///
    /// The cancellation token and slot ownership are checked under the same
    /// lock as the mutation, so nothing observed after a cancel is applied.
    pub(super) fn apply(&self, turn_id: u64, cancel: &CancellationToken, event: TurnEvent) -> Step {
        let mut state = self.lock();
        if cancel.is_cancelled() || !state.owns_slot(turn_id) {
            return Step::Finished(TurnOutcome::Cancelled);
        }
        let Some((new_state, events)) = state.step(turn_id, event) else {
            return Step::Continue;
        };
        drop(state);
        self.notify(events);
        match new_state.outcome() {
            Some(outcome) => Step::Finished(outcome),
            None => Step::Continue,
        }
    }

    /// Refresh the conversation index, logging instead of failing
    pub(super) async fn refresh_quietly(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "Failed to refresh conversation index");
        }
    }

    async fn refresh(&self) -> Result<(), BackendError> {
        let conversations = self.store.list().await?;
        let count = conversations.len();
        self.lock().conversations = conversations;
        self.notify(vec![SessionEvent::ConversationsRefreshed { count }]);
        Ok(())
    }

    fn record_location(&self, id: Option<&str>) {
        if let Some(location) = &self.location {
            if let Err(e) = location.save(id) {
                tracing::warn!(error = %e, "Failed to record active conversation");
            }
        }
    }

    fn conversation_changed(&self, id: Option<String>) {
        self.record_location(id.as_deref());
        self.notify(vec![SessionEvent::ConversationChanged { id }]);
    }
}

/// Awaitable handle for a spawned turn
pub struct TurnHandle {
    join: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    /// Wait for the turn and the index refresh that follows it
    pub async fn outcome(self) -> TurnOutcome {
        self.join.await.unwrap_or_else(|e| TurnOutcome::Failed {
            detail: format!("Turn task failed: {e}"),
        })
    }
}

/// Controller for one chat session
pub struct SessionController<B, S> {
    shared: Arc<Shared<B, S>>,
}

impl<B, S> Clone for SessionController<B, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B, S> SessionController<B, S>
where
    B: ChatBackend + 'static,
    S: ConversationStore + 'static,
{
    pub fn new(backend: B, store: S, settings: SessionSettings) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(Shared {
                backend,
                store,
                settings,
                location: None,
                state: Mutex::new(SessionState::default()),
                events,
            }),
        }
    }

    /// Record the active conversation id at `location` whenever it changes.
    /// Must be called before the controller is cloned.
    pub fn with_location(mut self, location: SessionLocation) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.location = Some(location);
        } else {
            tracing::warn!("Session location set on a shared controller; ignoring");
        }
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    pub fn is_turn_active(&self) -> bool {
        self.shared.lock().turn.is_some()
    }

    pub fn active_conversation(&self) -> Option<String> {
        self.shared.lock().active_conversation.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.shared.lock();
        SessionSnapshot {
            active_conversation: state.active_conversation.clone(),
            messages: state.messages.clone(),
            tool_calls: state.tools.calls().to_vec(),
            conversations: state.conversations.clone(),
            turn_state: state
                .turn
                .as_ref()
                .map(|t| t.state.clone())
                .unwrap_or_default(),
            last_outcome: state.last_outcome.clone(),
        }
    }

    /// Send a user utterance and start a turn.
    ///
    /// Returns `Ok(None)` without touching anything when the input is blank
    /// or a turn is already active. Creates a conversation first when none
    /// is active.
    pub async fn send_utterance(&self, text: &str) -> Result<Option<TurnHandle>, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        // Reserve the slot before the first await
        let (turn_id, cancel, needs_conversation) = {
            let mut state = self.shared.lock();
            if state.turn.is_some() {
                tracing::debug!("Turn already active, ignoring utterance");
                return Ok(None);
            }
            let turn_id = state.next_turn_id;
            state.next_turn_id += 1;
            let cancel = CancellationToken::new();
            state.turn = Some(ActiveTurn {
                id: turn_id,
                state: TurnState::Idle,
                message_index: None,
                cancel: cancel.clone(),
            });
            (turn_id, cancel, state.active_conversation.is_none())
        };

        let created = if needs_conversation {
            match self.shared.store.create(&conversation_title(text)).await {
                Ok(id) => {
                    tracing::info!(conv_id = %id, "Created conversation");
                    Some(id)
                }
                Err(e) => {
                    let mut state = self.shared.lock();
                    if state.owns_slot(turn_id) {
                        state.turn = None;
                    }
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        let request = {
            let mut state = self.shared.lock();
            if cancel.is_cancelled() || !state.owns_slot(turn_id) {
                tracing::debug!(turn_id, "Turn cancelled before dispatch");
                return Ok(None);
            }
            if let Some(id) = &created {
                state.active_conversation = Some(id.clone());
            }

            state.messages.push(Message::user(text));
            let messages = state.messages.iter().map(Message::to_wire).collect();
            state.messages.push(Message::pending_assistant());
            let message_index = state.messages.len() - 1;
            if let Some(turn) = state.turn.as_mut() {
                turn.message_index = Some(message_index);
            }
            state.step(turn_id, TurnEvent::Dispatch);

            ChatRequest {
                messages,
                tools_enabled: self.shared.settings.tools_enabled,
                conversation_id: state.active_conversation.clone(),
                model: self.shared.settings.model.clone(),
                stream: true,
            }
        };

        if created.is_some() {
            self.shared.conversation_changed(created);
        }

        let shared = Arc::clone(&self.shared);
        let join = tokio::spawn(turn::run(shared, turn_id, cancel, request));
        Ok(Some(TurnHandle { join }))
    }

    /// Cancel the active turn. Returns whether there was one.
    pub fn cancel_active_turn(&self) -> bool {
        let mut state = self.shared.lock();
        if state.turn.is_none() {
            return false;
        }
        let events = state.cancel_turn();
        drop(state);
        self.shared.notify(events);
        true
    }

    /// Load a conversation's history and make it active
    pub async fn select_conversation(&self, id: &str) -> Result<(), SessionError> {
        self.cancel_active_turn();
        let stored = self.shared.store.get(id).await?;
        let messages: Vec<Message> = stored
            .into_iter()
            .filter(|m| m.role != Role::System)
            .map(Message::from_stored)
            .collect();
        tracing::info!(conv_id = %id, messages = messages.len(), "Selected conversation");

        let events = {
            let mut state = self.shared.lock();
            // A send may have slipped in while the history was loading
            let events = state.cancel_turn();
            state.reset_transcript(Some(id.to_string()), messages);
            events
        };
        self.shared.notify(events);
        self.shared.conversation_changed(Some(id.to_string()));
        Ok(())
    }

    /// Start over with no active conversation
    pub fn clear_conversation(&self) {
        let events = {
            let mut state = self.shared.lock();
            let events = state.cancel_turn();
            state.reset_transcript(None, Vec::new());
            events
        };
        self.shared.notify(events);
        self.shared.conversation_changed(None);
    }

    /// Delete a conversation; clears the session if it was the active one
    pub async fn delete_conversation(&self, id: &str) -> Result<(), SessionError> {
        self.shared.store.delete(id).await?;
        tracing::info!(conv_id = %id, "Deleted conversation");

        let was_active = {
            let mut state = self.shared.lock();
            state.conversations.retain(|c| c.id != id);
            state.active_conversation.as_deref() == Some(id)
        };
        if was_active {
            self.clear_conversation();
        }
        Ok(())
    }

    /// Reload the conversation index from the store
    pub async fn refresh_conversations(&self) -> Result<(), SessionError> {
        self.shared.refresh().await?;
        Ok(())
    }
}

/// Title for a conversation created from its first utterance
pub fn conversation_title(text: &str) -> String {
    let text = text.trim();
    let mut title: String = text.chars().take(MAX_TITLE_CHARS).collect();
    if text.chars().count() > MAX_TITLE_CHARS {
        title = title.trim_end().to_string();
        title.push_str("...");
    }
    title
}
