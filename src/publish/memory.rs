//! In-memory [`StorageBackend`] with injectable failures.

use crate::error::{NarratorError, Result};
use crate::publish::{StorageBackend, Visibility};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// A file held by [`MemoryStorage`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub folder_id: String,
    pub content_type: String,
    pub size: usize,
    pub visibility: Option<Visibility>,
}

/// Storage backend that keeps uploads in memory.
///
/// `fail_creates(n)` / `fail_links(n)` make the first `n` calls of that kind
/// fail, which exercises the publisher's retry loop.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<Vec<StoredFile>>,
    linked: Mutex<Vec<String>>,
    create_failures: AtomicU32,
    link_failures: AtomicU32,
    create_calls: AtomicU32,
    grant_calls: AtomicU32,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_creates(self, count: u32) -> Self {
        self.create_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn fail_links(self, count: u32) -> Self {
        self.link_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn files(&self) -> Vec<StoredFile> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Ids whose public link was handed out.
    pub fn linked_files(&self) -> Vec<String> {
        self.linked.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn grant_calls(&self) -> u32 {
        self.grant_calls.load(Ordering::SeqCst)
    }

    /// Decrement a failure budget; true when this call should fail.
    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn with_file<R>(&self, file_id: &str, f: impl FnOnce(&mut StoredFile) -> R) -> Result<R> {
        let mut files = self
            .files
            .lock()
            .map_err(|e| NarratorError::Other(format!("storage poisoned: {e}")))?;
        files
            .iter_mut()
            .find(|file| file.id == file_id)
            .map(f)
            .ok_or_else(|| NarratorError::Other(format!("unknown file id: {file_id}")))
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryStorage {
    async fn create_file(
        &self,
        name: &str,
        folder_id: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<String> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if Self::take_failure(&self.create_failures) {
            return Err(NarratorError::Other("injected create failure".to_string()));
        }
        let id = format!("file-{call}");
        let mut files = self
            .files
            .lock()
            .map_err(|e| NarratorError::Other(format!("storage poisoned: {e}")))?;
        files.push(StoredFile {
            id: id.clone(),
            name: name.to_string(),
            folder_id: folder_id.to_string(),
            content_type: content_type.to_string(),
            size: content.len(),
            visibility: None,
        });
        Ok(id)
    }

    async fn grant_permission(&self, file_id: &str, visibility: &Visibility) -> Result<()> {
        self.grant_calls.fetch_add(1, Ordering::SeqCst);
        self.with_file(file_id, |file| file.visibility = Some(visibility.clone()))
    }

    async fn fetch_link(&self, file_id: &str) -> Result<String> {
        if Self::take_failure(&self.link_failures) {
            return Err(NarratorError::Other("injected link failure".to_string()));
        }
        let link = self.with_file(file_id, |file| {
            format!("memory://{}/{}/{}", file.folder_id, file.id, file.name)
        })?;
        if let Ok(mut linked) = self.linked.lock() {
            linked.push(file_id.to_string());
        }
        Ok(link)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
