//! Backend error types

use thiserror::Error;

/// Backend error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, message)
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Status(status), message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Decode, message)
    }

    /// HTTP status of a rejected request, if that is what this error is
    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            BackendErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::status(status.as_u16(), e.to_string()),
            None if e.is_decode() => Self::decode(e.to_string()),
            None => Self::network(e.to_string()),
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Connection refused, reset, or the body stream faulted
    Network,
    /// Non-success HTTP status
    Status(u16),
    /// Response body did not match the expected shape
    Decode,
}
