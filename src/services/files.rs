//! Remote file storage collaborator (the file proxy in front of Drive).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A file as listed by the remote folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

impl RemoteFile {
    /// Images and videos are mirrored; folders and documents are not.
    pub fn is_media(&self) -> bool {
        self.mime_type.starts_with("image/") || self.mime_type.starts_with("video/")
    }
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Files directly inside `folder_id`, in the remote's order.
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<RemoteFile>>;

    /// Public URL the listing site uses for a file.
    fn file_url(&self, file_id: &str) -> String;
}

/// File proxy over HTTP.
///
/// `GET {base}/folders/{id}/files` returns `{"files": [RemoteFile, ...]}`;
/// files are served from `{base}/files/{id}`.
pub struct HttpFileStorage {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct FolderListing {
    files: Vec<RemoteFile>,
}

impl HttpFileStorage {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FileStorage for HttpFileStorage {
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<RemoteFile>> {
        let url = format!("{}/folders/{folder_id}/files", self.base_url);
        let listing: FolderListing = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(listing.files)
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("{}/files/{file_id}", self.base_url)
    }
}

/// Fixed folder contents held in memory.
#[derive(Default)]
pub struct StaticFileStorage {
    folders: Mutex<HashMap<String, Vec<RemoteFile>>>,
}

impl StaticFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a folder's listing.
    pub fn set_folder(&self, folder_id: &str, files: Vec<RemoteFile>) -> Result<()> {
        self.folders
            .lock()
            .map_err(|_| Error::Other("file listing lock poisoned".to_string()))?
            .insert(folder_id.to_string(), files);
        Ok(())
    }
}

#[async_trait]
impl FileStorage for StaticFileStorage {
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<RemoteFile>> {
        self.folders
            .lock()
            .map_err(|_| Error::Other("file listing lock poisoned".to_string()))?
            .get(folder_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("folder {folder_id}")))
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("/files/{file_id}")
    }
}
