//! Per-run artifact directories.
//!
//! Each task run gets `<work_root>/<record_id>-<uuid>`, removed when the
//! [`TaskWorkspace`] is dropped, whichever way the task exits.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

#[derive(Debug)]
pub struct TaskWorkspace {
    dir: TempDir,
}

impl TaskWorkspace {
    pub fn create(work_root: &Path, record_id: &str) -> Result<Self> {
        std::fs::create_dir_all(work_root)?;
        let name = format!("{}-{}", file_safe(record_id), Uuid::new_v4());
        let dir = tempfile::Builder::new()
            .prefix(&name)
            .rand_bytes(0)
            .tempdir_in(work_root)?;
        tracing::debug!(path = %dir.path().display(), "created task workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a named artifact inside the workspace.
    pub fn artifact(&self, file_name: &str) -> PathBuf {
        self.dir.path().join(file_safe(file_name))
    }
}

/// Replace characters that would escape or break a single path component.
pub fn file_safe(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
