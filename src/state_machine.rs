//! Turn state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions: the
//! turn runner feeds [`TurnEvent`]s in, and applies the returned
//! [`Effect`]s to the pending assistant message and the tool tracker.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::TurnEvent;
pub use state::{TurnOutcome, TurnState};
pub use transition::{transition, TransitionError, TransitionResult};
