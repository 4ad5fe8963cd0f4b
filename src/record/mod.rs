//! Record store access.
//!
//! A record is one production job: a text prompt, a subject name, attachment
//! fields holding media references and two completion flags. The pipeline
//! only reads fields and writes the ones it owns; it never creates or deletes
//! records.

pub mod airtable;
pub mod memory;

use crate::error::Result;
use crate::publish::UploadResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub use airtable::AirtableGateway;
pub use memory::InMemoryGateway;

/// Names of the record fields the pipeline reads and writes.
///
/// Defaults are the literal column names of the production table, trailing
/// spaces included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FieldNames {
    pub text_prompt: String,
    pub subject_name: String,
    pub audio: String,
    pub video: String,
    pub merged: String,
    pub audio_complete: String,
    pub merge_complete: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            text_prompt: "Text Prompt".to_string(),
            subject_name: "Goods name".to_string(),
            audio: "Audio ".to_string(),
            video: "Video".to_string(),
            merged: "Audio + Video ".to_string(),
            audio_complete: "Audio Complete".to_string(),
            merge_complete: "Merge Complete ".to_string(),
        }
    }
}

/// One attachment entry (`{url, filename}`) of an attachment field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub filename: String,
}

/// A record as returned by the store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Non-empty, trimmed text value of a field.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// First attachment of an attachment field, if it has a usable URL.
    pub fn first_attachment(&self, field: &str) -> Option<Attachment> {
        let first = self.fields.get(field)?.as_array()?.first()?.clone();
        let attachment: Attachment = serde_json::from_value(first).ok()?;
        if attachment.url.trim().is_empty() {
            None
        } else {
            Some(attachment)
        }
    }

    /// Boolean flag value; absent or non-boolean reads as `false`.
    pub fn flag(&self, field: &str) -> bool {
        self.fields
            .get(field)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// A multi-field write applied to a record in one request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordUpdate {
    fields: Map<String, Value>,
}

impl RecordUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attachment field to a single uploaded artifact.
    pub fn attachment(mut self, field: &str, upload: &UploadResult) -> Self {
        self.fields.insert(
            field.to_string(),
            serde_json::json!([{ "url": upload.public_url, "filename": upload.filename }]),
        );
        self
    }

    /// Set a boolean flag field.
    pub fn flag(mut self, field: &str, value: bool) -> Self {
        self.fields.insert(field.to_string(), Value::Bool(value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Read/write access to records by id.
///
/// Writes are last-writer-wins; there is no optimistic concurrency control.
#[async_trait::async_trait]
pub trait RecordGateway: Send + Sync {
    /// Fetch a record. Fails with `RecordNotFound` for unknown ids.
    async fn get(&self, record_id: &str) -> Result<Record>;

    /// Apply a multi-field update. Fails with `RecordWrite`.
    async fn update(&self, record_id: &str, update: RecordUpdate) -> Result<()>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

#[async_trait::async_trait]
impl<T: RecordGateway + ?Sized> RecordGateway for Arc<T> {
    async fn get(&self, record_id: &str) -> Result<Record> {
        (**self).get(record_id).await
    }

    async fn update(&self, record_id: &str, update: RecordUpdate) -> Result<()> {
        (**self).update(record_id, update).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
