//! The persisted change token that lets a delta scan resume where the last
//! scan stopped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("sync state io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sync state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub page_token: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no scan has completed yet.
    pub async fn load(&self) -> Result<Option<SyncState>, StateError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes through a sibling temp file so a crash never leaves half a document.
    pub async fn save(&self, page_token: &str) -> Result<SyncState, StateError> {
        let state = SyncState {
            page_token: page_token.to_string(),
            saved_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&state)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(state)
    }
}
