//! HTTP implementation of the backend traits

use super::decoder::{decode_events, EventStream};
use super::types::{
    ChatRequest, ConversationSummary, CreatedConversation, HealthReport, ModelInfo,
    RawConversation, RawConversationHistory, RawStoredMessage, StoredMessage, ToolDescriptor,
};
use super::{BackendError, ChatBackend, ConversationStore};
use async_trait::async_trait;
use reqwest::{Client, IntoUrl, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound for the non-streaming endpoints. The chat stream itself has no
/// client-side timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest response body quoted in a status error
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Client for the chat server's REST surface
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    /// Collection root; ids are appended as encoded path segments
    conversations: Url,
    conversation_limit: usize,
}

impl HttpBackend {
    pub fn new(base_url: &str, conversation_limit: usize) -> Result<Self, BackendError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let conversations = Url::parse(&format!("{base_url}/api/memory/conversations"))
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| BackendError::network(format!("Invalid backend URL: {base_url}")))?;
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            conversations,
            conversation_limit,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// URL of one conversation. The id is a single segment whatever it contains.
    fn conversation_url(&self, id: &str) -> Result<Url, BackendError> {
        let mut url = self.conversations.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::network("Backend URL cannot carry a path"))?
            .push(id);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        self.fetch_json(self.url(path)).await
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: impl IntoUrl) -> Result<T, BackendError> {
        let response = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

/// Turn a non-success response into a `Status` error quoting the body
async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    let message = if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {body}", status.as_u16())
    };
    Err(BackendError::status(status.as_u16(), message))
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream, BackendError> {
        let response = self
            .client
            .post(self.url("/api/chat/stream"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(decode_events(response.bytes_stream()))
    }

    async fn check_health(&self) -> Result<HealthReport, BackendError> {
        let response = self
            .client
            .get(self.url("/api/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        self.get_json("/api/models").await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError> {
        self.get_json("/api/tools").await
    }
}

#[async_trait]
impl ConversationStore for HttpBackend {
    async fn create(&self, title: &str) -> Result<String, BackendError> {
        let response = self
            .client
            .post(self.url("/api/memory/conversations"))
            .query(&[("title", title)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let created: CreatedConversation = ensure_success(response).await?.json().await?;
        Ok(created.id)
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, BackendError> {
        let path = format!("/api/memory/conversations?limit={}", self.conversation_limit);
        let raw: Vec<RawConversation> = self.get_json(&path).await?;
        Ok(raw.into_iter().map(ConversationSummary::from).collect())
    }

    async fn get(&self, id: &str) -> Result<Vec<StoredMessage>, BackendError> {
        let history: RawConversationHistory =
            self.fetch_json(self.conversation_url(id)?).await?;
        Ok(history
            .messages
            .into_iter()
            .filter_map(RawStoredMessage::into_message)
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .delete(self.conversation_url(id)?)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
