//! Events that drive a turn

use crate::backend::StreamEvent;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// The request is about to be sent
    Dispatch,

    /// Response head arrived with a success status
    ResponseOpened,

    /// Response head arrived with a non-success status
    ResponseRejected { status: u16, detail: String },

    /// Connection failed or the body read faulted
    TransportFault { detail: String },

    /// One decoded frame
    Frame(StreamEvent),

    /// Frame sequence ended (end marker or EOF)
    StreamEnded,

    /// User asked to stop the turn
    CancelRequested,
}
