use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{
    auth::ServiceAccountAuth, ChangePage, DriveError, DriveFile, FilePage, FileTree, ListKind,
    RawChangeList, RawFile, RawFileList, FOLDER_MIME,
};
use crate::utils::retry::{retry, Backoff};

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const PAGE_SIZE: &str = "1000";
const FILE_FIELDS: &str = "id,name,mimeType,size,md5Checksum,parents,trashed,imageMediaMetadata(width,height)";

/// Five attempts per call, doubling from one second, never waiting more than 30s.
pub const LISTING_BACKOFF: Backoff = Backoff::new(5, Duration::from_secs(1), Duration::from_secs(30));

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartToken {
    start_page_token: String,
}

/// Google Drive v3 over plain HTTPS.
pub struct DriveClient {
    http: reqwest::Client,
    auth: ServiceAccountAuth,
    base_url: String,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, auth: ServiceAccountAuth) -> Self {
        Self {
            http,
            auth,
            base_url: API_BASE.to_string(),
        }
    }

    pub fn auth(&self) -> &ServiceAccountAuth {
        &self.auth
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DriveError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Http {
                status: status.as_u16(),
                body: crate::utils::truncate_chars(&body, 300),
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| DriveError::Parse(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        label: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DriveError> {
        retry(LISTING_BACKOFF, label, || self.get_once(path, query)).await
    }
}

fn children_query(folder_id: &str, kind: ListKind) -> String {
    let op = match kind {
        ListKind::Folders => "=",
        ListKind::Files => "!=",
    };
    format!("'{folder_id}' in parents and trashed = false and mimeType {op} '{FOLDER_MIME}'")
}

#[async_trait]
impl FileTree for DriveClient {
    async fn list_children(
        &self,
        folder_id: &str,
        kind: ListKind,
        page_token: Option<&str>,
    ) -> Result<FilePage, DriveError> {
        let q = children_query(folder_id, kind);
        let fields = format!("nextPageToken,files({FILE_FIELDS})");
        let mut query = vec![
            ("q", q.as_str()),
            ("fields", fields.as_str()),
            ("pageSize", PAGE_SIZE),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let raw: RawFileList = self.get("files.list", "/files", &query).await?;
        Ok(FilePage {
            files: raw.files.into_iter().map(DriveFile::from).collect(),
            next_page_token: raw.next_page_token,
        })
    }

    async fn get_file(&self, id: &str) -> Result<DriveFile, DriveError> {
        let raw: RawFile = self
            .get(
                "files.get",
                &format!("/files/{id}"),
                &[("fields", FILE_FIELDS), ("supportsAllDrives", "true")],
            )
            .await?;
        Ok(raw.into())
    }

    async fn start_page_token(&self) -> Result<String, DriveError> {
        let token: StartToken = self
            .get(
                "changes.getStartPageToken",
                "/changes/startPageToken",
                &[("supportsAllDrives", "true")],
            )
            .await?;
        Ok(token.start_page_token)
    }

    async fn list_changes(&self, page_token: &str) -> Result<ChangePage, DriveError> {
        let fields = format!("nextPageToken,newStartPageToken,changes(fileId,removed,file({FILE_FIELDS}))");
        let raw: RawChangeList = self
            .get(
                "changes.list",
                "/changes",
                &[
                    ("pageToken", page_token),
                    ("pageSize", PAGE_SIZE),
                    ("fields", fields.as_str()),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ],
            )
            .await?;
        Ok(raw.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_queries_split_folders_from_files() {
        let folders = children_query("root1", ListKind::Folders);
        assert!(folders.starts_with("'root1' in parents"));
        assert!(folders.ends_with(&format!("mimeType = '{FOLDER_MIME}'")));

        let files = children_query("root1", ListKind::Files);
        assert!(files.contains("mimeType != "));
        assert!(files.contains("trashed = false"));
    }
}
