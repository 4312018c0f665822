//! Turn runner
//!
//! Drives one request from dispatch to a terminal state. Every observation is
//! turned into a [`TurnEvent`] and handed to the session; the runner itself
//! never touches the transcript.

use super::session::{Shared, Step};
use crate::backend::{BackendError, ChatBackend, ChatRequest, ConversationStore};
use crate::state_machine::{TurnEvent, TurnOutcome};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub(super) async fn run<B, S>(
    shared: Arc<Shared<B, S>>,
    turn_id: u64,
    cancel: CancellationToken,
    request: ChatRequest,
) -> TurnOutcome
where
    B: ChatBackend,
    S: ConversationStore,
{
    let started = Instant::now();
    let outcome = drive(&shared, turn_id, &cancel, &request).await;
    tracing::debug!(
        turn_id,
        duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Turn task done"
    );

    // Titles and ordering may have changed server-side, and a first turn
    // may have created the conversation
    shared.refresh_quietly().await;
    outcome
}

async fn drive<B, S>(
    shared: &Shared<B, S>,
    turn_id: u64,
    cancel: &CancellationToken,
    request: &ChatRequest,
) -> TurnOutcome
where
    B: ChatBackend,
    S: ConversationStore,
{
    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => return TurnOutcome::Cancelled,
        result = shared.backend.open_stream(request) => result,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => return finish(shared.apply(turn_id, cancel, failure_event(&e))),
    };

    if let Step::Finished(outcome) = shared.apply(turn_id, cancel, TurnEvent::ResponseOpened) {
        return outcome;
    }

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return TurnOutcome::Cancelled,
            next = stream.next() => next,
        };

        let event = match next {
            Some(Ok(frame)) => TurnEvent::Frame(frame),
            Some(Err(e)) => {
                tracing::warn!(turn_id, error = %e, "Stream read failed");
                TurnEvent::TransportFault {
                    detail: e.to_string(),
                }
            }
            None => TurnEvent::StreamEnded,
        };

        if let Step::Finished(outcome) = shared.apply(turn_id, cancel, event) {
            return outcome;
        }
    }
}

/// Map a failed dispatch to the event the state machine expects
fn failure_event(error: &BackendError) -> TurnEvent {
    match error.status_code() {
        Some(status) => TurnEvent::ResponseRejected {
            status,
            detail: error.to_string(),
        },
        None => TurnEvent::TransportFault {
            detail: error.to_string(),
        },
    }
}

fn finish(step: Step) -> TurnOutcome {
    match step {
        Step::Finished(outcome) => outcome,
        // The state machine ends every failed dispatch
        Step::Continue => TurnOutcome::Failed {
            detail: "Turn did not finish after a failed dispatch".to_string(),
        },
    }
}
