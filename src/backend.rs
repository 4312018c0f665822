//! Backend abstraction
//!
//! The chat backend and the conversation store are external collaborators;
//! the session only talks to them through the traits below.

pub mod decoder;
mod error;
mod http;
mod types;

pub use decoder::{decode_events, EventStream};
pub use error::{BackendError, BackendErrorKind};
pub use http::HttpBackend;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Streaming chat endpoint plus the read-only endpoints around it
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Dispatch a chat request and return the decoded event stream once the
    /// response head has arrived. A non-success status is an error of kind
    /// `Status`.
    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream, BackendError>;

    /// Lightweight reachability check
    async fn check_health(&self) -> Result<HealthReport, BackendError>;

    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError>;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError>;
}

/// Remote conversation persistence
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation and return its id
    async fn create(&self, title: &str) -> Result<String, BackendError>;

    /// Conversation index, most recently updated first
    async fn list(&self) -> Result<Vec<ConversationSummary>, BackendError>;

    /// Full message history of one conversation
    async fn get(&self, id: &str) -> Result<Vec<StoredMessage>, BackendError>;

    async fn delete(&self, id: &str) -> Result<(), BackendError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream, BackendError> {
        (**self).open_stream(request).await
    }

    async fn check_health(&self) -> Result<HealthReport, BackendError> {
        (**self).check_health().await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        (**self).list_models().await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError> {
        (**self).list_tools().await
    }
}

#[async_trait]
impl<T: ConversationStore + ?Sized> ConversationStore for Arc<T> {
    async fn create(&self, title: &str) -> Result<String, BackendError> {
        (**self).create(title).await
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, BackendError> {
        (**self).list().await
    }

    async fn get(&self, id: &str) -> Result<Vec<StoredMessage>, BackendError> {
        (**self).get(id).await
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        (**self).delete(id).await
    }
}

/// Logging wrapper for chat backends
pub struct LoggingBackend<B> {
    inner: B,
}

impl<B: ChatBackend> LoggingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B: ChatBackend> ChatBackend for LoggingBackend<B> {
    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream, BackendError> {
        let start = std::time::Instant::now();
        let result = self.inner.open_stream(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    conv_id = ?request.conversation_id,
                    messages = request.messages.len(),
                    duration_ms = %duration.as_millis(),
                    "Chat stream opened"
                );
            }
            Err(e) => {
                tracing::error!(
                    conv_id = ?request.conversation_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    status = ?e.status_code(),
                    "Chat request failed"
                );
            }
        }

        result
    }

    async fn check_health(&self) -> Result<HealthReport, BackendError> {
        let result = self.inner.check_health().await;
        if let Err(e) = &result {
            tracing::debug!(error = %e, "Health check failed");
        }
        result
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        self.inner.list_models().await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError> {
        self.inner.list_tools().await
    }
}
