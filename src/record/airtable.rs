//! Airtable REST implementation of [`RecordGateway`].

use crate::config::RecordsConfig;
use crate::defaults;
use crate::error::{NarratorError, Result};
use crate::record::{Record, RecordGateway, RecordUpdate};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct AirtableRecord {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Record gateway backed by one Airtable table.
#[derive(Debug, Clone)]
pub struct AirtableGateway {
    client: reqwest::Client,
    base_url: String,
    base_id: String,
    table: String,
    api_key: String,
}

impl AirtableGateway {
    pub fn new(
        base_url: impl Into<String>,
        base_id: impl Into<String>,
        table: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(defaults::HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| NarratorError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            base_id: base_id.into(),
            table: table.into(),
            api_key: api_key.into(),
        })
    }

    /// Build from the `[records]` config section.
    pub fn from_config(config: &RecordsConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| NarratorError::ConfigInvalidValue {
                key: "records.api_key".to_string(),
                message: "required (or set NARRATOR_RECORDS_API_KEY)".to_string(),
            })?;
        if config.base_id.is_empty() || config.table.is_empty() {
            return Err(NarratorError::ConfigInvalidValue {
                key: "records.base_id".to_string(),
                message: "records.base_id and records.table are required".to_string(),
            });
        }
        Self::new(&config.base_url, &config.base_id, &config.table, api_key)
    }

    fn record_url(&self, record_id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.base_id,
            encode_segment(&self.table),
            encode_segment(record_id)
        )
    }
}

/// Percent-encode one URL path segment.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[async_trait::async_trait]
impl RecordGateway for AirtableGateway {
    async fn get(&self, record_id: &str) -> Result<Record> {
        let response = self
            .client
            .get(self.record_url(record_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| NarratorError::Other(format!("Record store request failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(NarratorError::RecordNotFound {
                record_id: record_id.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(NarratorError::Other(format!(
                "Record store returned status {} for {record_id}",
                response.status()
            )));
        }

        let body: AirtableRecord = response
            .json()
            .await
            .map_err(|e| NarratorError::Other(format!("Invalid record store response: {e}")))?;
        Ok(Record::new(body.id, body.fields))
    }

    async fn update(&self, record_id: &str, update: RecordUpdate) -> Result<()> {
        let payload = serde_json::json!({ "fields": Value::Object(update.into_fields()) });
        let response = self
            .client
            .patch(self.record_url(record_id))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NarratorError::RecordWrite {
                record_id: record_id.to_string(),
                message: e.to_string(),
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(NarratorError::RecordNotFound {
                record_id: record_id.to_string(),
            }),
            status if status.is_success() => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(NarratorError::RecordWrite {
                    record_id: record_id.to_string(),
                    message: format!("status {status}: {body}"),
                })
            }
        }
    }

    fn name(&self) -> &str {
        "airtable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    type Patches = Arc<Mutex<Vec<(String, Value)>>>;

    async fn spawn_store(patches: Patches) -> String {
        async fn get_record(
            Path((_base, _table, id)): Path<(String, String, String)>,
            headers: HeaderMap,
        ) -> axum::response::Response {
            use axum::response::IntoResponse;
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some("Bearer secret");
            if !authorized {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            if id == "rec1" {
                Json(serde_json::json!({
                    "id": "rec1",
                    "createdTime": "2024-01-01T00:00:00.000Z",
                    "fields": { "Text Prompt": "Hello world", "Goods name": "Widget" }
                }))
                .into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }

        async fn patch_record(
            State(patches): State<Patches>,
            Path((_base, _table, id)): Path<(String, String, String)>,
            Json(body): Json<Value>,
        ) -> StatusCode {
            if id == "locked" {
                return StatusCode::UNPROCESSABLE_ENTITY;
            }
            if let Ok(mut guard) = patches.lock() {
                guard.push((id, body));
            }
            StatusCode::OK
        }

        let app = Router::new()
            .route("/:base/:table/:id", get(get_record).patch(patch_record))
            .with_state(patches);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_record_url_encodes_table_name() {
        let gateway =
            AirtableGateway::new("https://api.airtable.com/v0/", "app1", "My Table", "k").unwrap();
        assert_eq!(
            gateway.record_url("rec1"),
            "https://api.airtable.com/v0/app1/My%20Table/rec1"
        );
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = RecordsConfig::default();
        assert!(matches!(
            AirtableGateway::from_config(&config),
            Err(NarratorError::ConfigInvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_parses_fields() {
        let base = spawn_store(Arc::default()).await;
        let gateway = AirtableGateway::new(base, "app1", "Products", "secret").unwrap();

        let record = gateway.get("rec1").await.unwrap();
        assert_eq!(record.id, "rec1");
        assert_eq!(record.text("Text Prompt"), Some("Hello world"));
        assert_eq!(record.text("Goods name"), Some("Widget"));
    }

    #[tokio::test]
    async fn test_get_unknown_record_is_not_found() {
        let base = spawn_store(Arc::default()).await;
        let gateway = AirtableGateway::new(base, "app1", "Products", "secret").unwrap();

        assert!(matches!(
            gateway.get("recMissing").await,
            Err(NarratorError::RecordNotFound { record_id }) if record_id == "recMissing"
        ));
    }

    #[tokio::test]
    async fn test_update_sends_fields_payload() {
        let patches: Patches = Arc::default();
        let base = spawn_store(Arc::clone(&patches)).await;
        let gateway = AirtableGateway::new(base, "app1", "Products", "secret").unwrap();

        let update = RecordUpdate::new().flag("Audio Complete", true);
        gateway.update("rec1", update).await.unwrap();

        let recorded = patches.lock().unwrap().clone();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "rec1");
        assert_eq!(
            recorded[0].1,
            serde_json::json!({ "fields": { "Audio Complete": true } })
        );
    }

    #[tokio::test]
    async fn test_update_rejected_is_record_write_error() {
        let base = spawn_store(Arc::default()).await;
        let gateway = AirtableGateway::new(base, "app1", "Products", "secret").unwrap();

        let result = gateway
            .update("locked", RecordUpdate::new().flag("x", true))
            .await;
        assert!(matches!(result, Err(NarratorError::RecordWrite { .. })));
    }
}
