//! Client configuration from the environment

use crate::health;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CONVERSATION_LIMIT: usize = 20;

/// Configuration for the chat client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend root, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Model override sent with each chat request
    pub model: Option<String>,
    pub tools_enabled: bool,
    pub health_interval: Duration,
    /// Page size for the conversation index
    pub conversation_limit: usize,
    /// Where the active conversation id is recorded
    pub session_file: PathBuf,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let session_file = var("CHATLINE_SESSION_FILE").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".chatline").join("session.json")
            },
            PathBuf::from,
        );

        Self {
            base_url: var("CHATLINE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: var("CHATLINE_MODEL").filter(|m| !m.is_empty()),
            tools_enabled: var("CHATLINE_TOOLS").as_deref().is_none_or(parse_flag),
            health_interval: var("CHATLINE_HEALTH_INTERVAL_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map_or(health::DEFAULT_INTERVAL, Duration::from_secs),
            conversation_limit: var("CHATLINE_CONVERSATION_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CONVERSATION_LIMIT),
            session_file,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no"
    )
}
