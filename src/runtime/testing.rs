//! Mock implementations for testing
//!
//! These mocks let the session and health monitor run without a server.

use crate::backend::decoder::{decode_chunks, decode_events};
use crate::backend::{
    BackendError, ChatBackend, ChatRequest, ConversationStore, ConversationSummary, EventStream,
    HealthReport, ModelInfo, Role, StoredMessage, ToolDescriptor,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Stream terminator
pub const END: &str = "data: [DONE]\n\n";

/// Wrap a JSON payload as one data frame
pub fn data_frame(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

// ============================================================================
// Mock chat backend
// ============================================================================

/// What the next `open_stream` call does
pub enum ScriptedResponse {
    /// Success status, then these body chunks
    Frames(Vec<String>),
    /// Non-success status
    Rejected { status: u16, body: String },
    /// Connection refused
    Unreachable(String),
    /// Success status; the test feeds body chunks through the channel
    Live(mpsc::Receiver<Result<Bytes, io::Error>>),
    /// Response head never arrives
    Hang,
}

/// Mock backend that replays queued responses
pub struct MockBackend {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<ChatRequest>>,
    healthy: AtomicBool,
    model: Mutex<String>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            model: Mutex::new("mock-model".to_string()),
        }
    }

    pub fn queue(&self, response: ScriptedResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Queue a successful response made of whole frames
    pub fn queue_frames(&self, frames: &[&str]) {
        let mut chunks: Vec<String> = frames.iter().map(|f| data_frame(f)).collect();
        chunks.push(END.to_string());
        self.queue(ScriptedResponse::Frames(chunks));
    }

    /// Queue a live response and return the sender that feeds it
    pub fn queue_live(&self) -> mpsc::Sender<Result<Bytes, io::Error>> {
        let (tx, rx) = mpsc::channel(16);
        self.queue(ScriptedResponse::Live(rx));
        tx
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_model(&self, model: &str) {
        *self.model.lock().unwrap() = model.to_string();
    }

    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        let response = self.responses.lock().unwrap().pop_front();
        match response {
            Some(ScriptedResponse::Frames(chunks)) => Ok(decode_chunks(chunks)),
            Some(ScriptedResponse::Rejected { status, body }) => {
                Err(BackendError::status(status, format!("HTTP {status}: {body}")))
            }
            Some(ScriptedResponse::Unreachable(message)) => Err(BackendError::network(message)),
            Some(ScriptedResponse::Live(rx)) => Ok(decode_events(ReceiverStream::new(rx))),
            Some(ScriptedResponse::Hang) => std::future::pending().await,
            None => Err(BackendError::network("No mock response queued")),
        }
    }

    async fn check_health(&self) -> Result<HealthReport, BackendError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(BackendError::network("connection refused"));
        }
        Ok(HealthReport {
            status: "healthy".to_string(),
            backend: "mock".to_string(),
            model: self.model.lock().unwrap().clone(),
            tools_count: 0,
            uptime_seconds: 1.0,
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        Ok(vec![ModelInfo {
            name: self.model.lock().unwrap().clone(),
            available: true,
        }])
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Mock conversation store
// ============================================================================

#[derive(Default)]
struct StoreState {
    next_id: usize,
    conversations: Vec<(String, String)>,
    histories: HashMap<String, Vec<StoredMessage>>,
}

/// In-memory conversation store
#[derive(Default)]
pub struct MockStore {
    state: Mutex<StoreState>,
    /// Titles passed to `create`, in call order
    pub created_titles: Mutex<Vec<String>>,
    fail_list: AtomicBool,
    fail_create: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation with a stored history
    pub fn insert(&self, id: &str, title: &str, messages: &[(Role, &str)]) {
        let now = Utc::now();
        let history = messages
            .iter()
            .enumerate()
            .map(|(i, (role, content))| StoredMessage {
                id: format!("{id}-m{i}"),
                role: *role,
                content: (*content).to_string(),
                timestamp: now,
            })
            .collect();
        let mut state = self.state.lock().unwrap();
        state.conversations.push((id.to_string(), title.to_string()));
        state.histories.insert(id.to_string(), history);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .conversations
            .iter()
            .any(|(c, _)| c == id)
    }
}

#[async_trait]
impl ConversationStore for MockStore {
    async fn create(&self, title: &str) -> Result<String, BackendError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BackendError::status(500, "HTTP 500: store unavailable"));
        }
        self.created_titles.lock().unwrap().push(title.to_string());
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("conv-{}", state.next_id);
        state.conversations.push((id.clone(), title.to_string()));
        state.histories.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, BackendError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(BackendError::network("connection reset"));
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .conversations
            .iter()
            .rev()
            .map(|(id, title)| ConversationSummary {
                id: id.clone(),
                title: Some(title.clone()),
                updated_at: Utc::now(),
            })
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Vec<StoredMessage>, BackendError> {
        self.state
            .lock()
            .unwrap()
            .histories
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::status(404, "HTTP 404: Conversation not found"))
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        let before = state.conversations.len();
        state.conversations.retain(|(c, _)| c != id);
        state.histories.remove(id);
        if state.conversations.len() == before {
            return Err(BackendError::status(404, "HTTP 404: Conversation not found"));
        }
        Ok(())
    }
}
