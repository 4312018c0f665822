//! Persisted pointer to the active conversation
//!
//! A small JSON file so a restarted client can resume where it left off.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid session file: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LocationFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionLocation {
    path: PathBuf,
}

impl SessionLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The recorded conversation id. A missing file means none.
    pub fn load(&self) -> Result<Option<String>, LocationError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: LocationFile = serde_json::from_str(&raw)?;
        Ok(file.conversation_id.filter(|id| !id.is_empty()))
    }

    pub fn save(&self, conversation_id: Option<&str>) -> Result<(), LocationError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = LocationFile {
            conversation_id: conversation_id.map(str::to_string),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}
