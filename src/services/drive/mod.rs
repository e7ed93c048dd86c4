//! Read-only access to the hierarchical file tree holding the artwork.

mod auth;
mod client;

pub use auth::ServiceAccountAuth;
pub use client::DriveClient;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::utils::retry::{is_transient_reqwest, is_transient_status, Transient};

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("file tree API returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("unexpected response: {0}")]
    Parse(String),
}

impl Transient for DriveError {
    fn is_transient(&self) -> bool {
        match self {
            DriveError::Network(e) => is_transient_reqwest(e),
            DriveError::Http { status, .. } => is_transient_status(*status),
            DriveError::Auth(_) | DriveError::Parse(_) => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<i64>,
    pub md5_checksum: Option<String>,
    pub parents: Vec<String>,
    pub trashed: bool,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilePage {
    pub files: Vec<DriveFile>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Change {
    pub file_id: String,
    pub removed: bool,
    pub file: Option<DriveFile>,
}

#[derive(Debug, Clone, Default)]
pub struct ChangePage {
    pub changes: Vec<Change>,
    pub next_page_token: Option<String>,
    pub new_start_page_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Folders,
    Files,
}

#[async_trait]
pub trait FileTree: Send + Sync {
    async fn list_children(
        &self,
        folder_id: &str,
        kind: ListKind,
        page_token: Option<&str>,
    ) -> Result<FilePage, DriveError>;

    async fn get_file(&self, id: &str) -> Result<DriveFile, DriveError>;

    async fn start_page_token(&self) -> Result<String, DriveError>;

    async fn list_changes(&self, page_token: &str) -> Result<ChangePage, DriveError>;
}

// Wire shapes of the v3 API.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawImageMetadata {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    size: Option<String>,
    md5_checksum: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    trashed: bool,
    image_media_metadata: Option<RawImageMetadata>,
}

impl From<RawFile> for DriveFile {
    fn from(raw: RawFile) -> Self {
        let (image_width, image_height) = raw
            .image_media_metadata
            .map(|m| (m.width, m.height))
            .unwrap_or((None, None));
        Self {
            id: raw.id,
            name: raw.name,
            mime_type: raw.mime_type,
            size: raw.size.and_then(|s| s.parse().ok()),
            md5_checksum: raw.md5_checksum,
            parents: raw.parents,
            trashed: raw.trashed,
            image_width,
            image_height,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawFileList {
    #[serde(default)]
    files: Vec<RawFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawChange {
    file_id: Option<String>,
    #[serde(default)]
    removed: bool,
    file: Option<RawFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawChangeList {
    #[serde(default)]
    changes: Vec<RawChange>,
    next_page_token: Option<String>,
    new_start_page_token: Option<String>,
}

impl From<RawChangeList> for ChangePage {
    fn from(raw: RawChangeList) -> Self {
        Self {
            changes: raw
                .changes
                .into_iter()
                .filter_map(|c| {
                    let file_id = c.file_id.or_else(|| c.file.as_ref().map(|f| f.id.clone()))?;
                    Some(Change {
                        file_id,
                        removed: c.removed,
                        file: c.file.map(DriveFile::from),
                    })
                })
                .collect(),
            next_page_token: raw.next_page_token,
            new_start_page_token: raw.new_start_page_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_file_parses_string_sizes_and_image_metadata() {
        let raw: RawFile = serde_json::from_value(serde_json::json!({
            "id": "f1",
            "name": "Sunrise_4000x3000.jpg",
            "mimeType": "image/jpeg",
            "size": "123456",
            "parents": ["p1"],
            "imageMediaMetadata": {"width": 4000, "height": 3000}
        }))
        .unwrap();
        let file = DriveFile::from(raw);
        assert_eq!(file.size, Some(123456));
        assert_eq!(file.image_width, Some(4000));
        assert_eq!(file.parents, vec!["p1".to_string()]);
        assert!(!file.trashed);
    }

    #[test]
    fn change_list_keeps_tokens_and_drops_anonymous_changes() {
        let raw: RawChangeList = serde_json::from_value(serde_json::json!({
            "changes": [
                {"fileId": "a", "removed": true},
                {"file": {"id": "b", "name": "b.png", "mimeType": "image/png"}},
                {"removed": false}
            ],
            "newStartPageToken": "42"
        }))
        .unwrap();
        let page = ChangePage::from(raw);
        assert_eq!(page.changes.len(), 2);
        assert_eq!(page.changes[1].file_id, "b");
        assert_eq!(page.new_start_page_token.as_deref(), Some("42"));
        assert!(page.next_page_token.is_none());
    }
}
