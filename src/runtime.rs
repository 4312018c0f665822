//! Session runtime
//!
//! The controller owns the transcript and the single-flight turn slot; each
//! turn runs as its own task and reports back through the state machine.

mod message;
mod session;
mod turn;

#[cfg(test)]
pub mod testing;


pub use message::Message;
pub use session::{
    conversation_title, SessionController, SessionError, SessionEvent, SessionSettings,
    SessionSnapshot, TurnHandle, MAX_TITLE_CHARS,
};
