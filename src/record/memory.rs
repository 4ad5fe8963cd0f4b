//! In-memory [`RecordGateway`] used by tests and `--dry-run` style wiring.

use crate::error::{NarratorError, Result};
use crate::record::{Record, RecordGateway, RecordUpdate};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Record store held in a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    records: Mutex<HashMap<String, Map<String, Value>>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record; `fields` must be a JSON object.
    pub fn with_record(self, record_id: &str, fields: Value) -> Self {
        self.insert(record_id, fields);
        self
    }

    pub fn insert(&self, record_id: &str, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Ok(mut records) = self.records.lock() {
            records.insert(record_id.to_string(), fields);
        }
    }

    /// Make every subsequent `update` fail with `RecordWrite`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of a record's fields.
    pub fn fields(&self, record_id: &str) -> Option<Map<String, Value>> {
        self.records.lock().ok()?.get(record_id).cloned()
    }

    /// Number of successful updates applied so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RecordGateway for InMemoryGateway {
    async fn get(&self, record_id: &str) -> Result<Record> {
        let records = self
            .records
            .lock()
            .map_err(|e| NarratorError::Other(format!("record map poisoned: {e}")))?;
        records
            .get(record_id)
            .map(|fields| Record::new(record_id, fields.clone()))
            .ok_or_else(|| NarratorError::RecordNotFound {
                record_id: record_id.to_string(),
            })
    }

    async fn update(&self, record_id: &str, update: RecordUpdate) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(NarratorError::RecordWrite {
                record_id: record_id.to_string(),
                message: "writes disabled".to_string(),
            });
        }
        let mut records = self
            .records
            .lock()
            .map_err(|e| NarratorError::RecordWrite {
                record_id: record_id.to_string(),
                message: format!("record map poisoned: {e}"),
            })?;
        let fields = records
            .get_mut(record_id)
            .ok_or_else(|| NarratorError::RecordNotFound {
                record_id: record_id.to_string(),
            })?;
        fields.extend(update.into_fields());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
