//! Google Drive v3 implementation of [`StorageBackend`].

use crate::config::PublishConfig;
use crate::defaults;
use crate::error::{NarratorError, Result};
use crate::fetch::transfer_client;
use crate::publish::{StorageBackend, Visibility};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const BOUNDARY: &str = "narrator-upload-boundary";

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileLink {
    web_content_link: Option<String>,
}

/// Drive backend authenticated with an OAuth bearer token.
#[derive(Debug, Clone)]
pub struct GoogleDriveBackend {
    client: reqwest::Client,
    base_url: String,
    upload_url: String,
    access_token: String,
}

impl GoogleDriveBackend {
    pub fn new(
        base_url: impl Into<String>,
        upload_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        let client = transfer_client(
            Duration::from_secs(defaults::TRANSFER_CONNECT_TIMEOUT_SECS),
            Duration::from_secs(defaults::TRANSFER_READ_TIMEOUT_SECS),
        )?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            upload_url: upload_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    /// Build from the `[publish]` config section.
    pub fn from_config(config: &PublishConfig) -> Result<Self> {
        let token = config
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| NarratorError::ConfigInvalidValue {
                key: "publish.access_token".to_string(),
                message: "required (or set NARRATOR_PUBLISH_ACCESS_TOKEN)".to_string(),
            })?;
        Self::new(&config.base_url, &config.upload_url, token)
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(NarratorError::Other(format!(
            "Drive {what} failed with status {status}: {body}"
        )))
    }
}

/// `multipart/related` body: JSON metadata part followed by the media part.
fn related_body(metadata: &serde_json::Value, content_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Type: {content_type}\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[async_trait::async_trait]
impl StorageBackend for GoogleDriveBackend {
    async fn create_file(
        &self,
        name: &str,
        folder_id: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<String> {
        let metadata = if folder_id.is_empty() {
            json!({ "name": name })
        } else {
            json!({ "name": name, "parents": [folder_id] })
        };
        let response = self
            .client
            .post(format!("{}/files?uploadType=multipart", self.upload_url))
            .bearer_auth(&self.access_token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={BOUNDARY}"),
            )
            .body(related_body(&metadata, content_type, &content))
            .send()
            .await
            .map_err(|e| NarratorError::Other(format!("Drive upload request failed: {e}")))?;
        let created: CreatedFile = Self::check(response, "upload")
            .await?
            .json()
            .await
            .map_err(|e| NarratorError::Other(format!("Invalid Drive upload response: {e}")))?;
        tracing::debug!(file = name, id = %created.id, "created Drive file");
        Ok(created.id)
    }

    async fn grant_permission(&self, file_id: &str, visibility: &Visibility) -> Result<()> {
        let permission = match visibility {
            Visibility::Private => return Ok(()),
            Visibility::Anyone => json!({ "type": "anyone", "role": "reader" }),
            Visibility::Domain(domain) => {
                json!({ "type": "domain", "role": "reader", "domain": domain })
            }
        };
        let response = self
            .client
            .post(format!("{}/files/{file_id}/permissions", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&permission)
            .send()
            .await
            .map_err(|e| NarratorError::Other(format!("Drive permission request failed: {e}")))?;
        Self::check(response, "permission grant").await?;
        Ok(())
    }

    async fn fetch_link(&self, file_id: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/files/{file_id}", self.base_url))
            .query(&[("fields", "webContentLink")])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| NarratorError::Other(format!("Drive link request failed: {e}")))?;
        let link: FileLink = Self::check(response, "link lookup")
            .await?
            .json()
            .await
            .map_err(|e| NarratorError::Other(format!("Invalid Drive link response: {e}")))?;
        link.web_content_link
            .filter(|l| !l.is_empty())
            .ok_or_else(|| NarratorError::Other(format!("Drive file {file_id} has no download link")))
    }

    fn name(&self) -> &str {
        "google-drive"
    }
}
