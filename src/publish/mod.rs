//! Publishing finished artifacts to durable storage.
//!
//! One publish is three backend calls (create file, grant permission, fetch
//! link). They are retried together as one unit with exponential backoff; a
//! publish either yields an [`UploadResult`] or a single `Publish` error
//! carrying the last cause.

pub mod drive;
pub mod memory;

use crate::defaults;
use crate::error::{NarratorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use drive::GoogleDriveBackend;
pub use memory::MemoryStorage;

/// Public reference to a published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub public_url: String,
    pub filename: String,
}

/// Who may read a published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Visibility {
    /// No permission is granted beyond the uploading account.
    Private,
    /// Readable by every account in the given domain.
    Domain(String),
    /// Readable by anyone holding the link.
    #[default]
    Anyone,
}

/// Content type chosen from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let is_mp4 = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));
    if is_mp4 { "video/mp4" } else { "audio/wav" }
}

/// Exponential backoff for the publish unit.
///
/// The wait after failed attempt `n` (1-based) is `2^(n-1)` seconds clamped
/// to `[min_delay, max_delay]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: defaults::PUBLISH_ATTEMPTS,
            min_delay: Duration::from_secs(defaults::PUBLISH_BACKOFF_MIN_SECS),
            max_delay: Duration::from_secs(defaults::PUBLISH_BACKOFF_MAX_SECS),
        }
    }
}

impl RetryPolicy {
    /// Retry without waiting (tests and local backends).
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let raw = Duration::from_secs(1u64 << exponent);
        raw.clamp(self.min_delay, self.max_delay.max(self.min_delay))
    }

    /// All waits a fully failing publish goes through.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.attempts.max(1))
            .map(|attempt| self.delay_after(attempt))
            .collect()
    }
}

/// Remote storage offering the three calls a publish is made of.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `content` as `name` inside `folder_id`; returns the file id.
    async fn create_file(
        &self,
        name: &str,
        folder_id: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<String>;

    /// Grant read access according to `visibility`.
    async fn grant_permission(&self, file_id: &str, visibility: &Visibility) -> Result<()>;

    /// Resolve the public download link of a file.
    async fn fetch_link(&self, file_id: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Uploads local artifacts and returns their public reference.
pub struct MediaPublisher {
    backend: Arc<dyn StorageBackend>,
    policy: RetryPolicy,
    visibility: Visibility,
}

impl std::fmt::Debug for MediaPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPublisher")
            .field("backend", &self.backend.name())
            .field("policy", &self.policy)
            .field("visibility", &self.visibility)
            .finish()
    }
}

impl MediaPublisher {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            policy: RetryPolicy::default(),
            visibility: Visibility::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Upload `local_path` into `folder_id`.
    ///
    /// The local file is read once; create/grant/link are retried together.
    pub async fn publish(&self, local_path: &Path, folder_id: &str) -> Result<UploadResult> {
        let filename = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| NarratorError::Other(format!(
                "Artifact path has no file name: {}",
                local_path.display()
            )))?
            .to_string();
        let content_type = content_type_for(local_path);
        let content = tokio::fs::read(local_path).await?;

        let attempts = self.policy.attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self
                .publish_once(&filename, folder_id, content_type, content.clone())
                .await
            {
                Ok(public_url) => {
                    tracing::info!(
                        file = %filename,
                        backend = self.backend.name(),
                        attempt,
                        "published artifact"
                    );
                    return Ok(UploadResult {
                        public_url,
                        filename,
                    });
                }
                Err(err) => {
                    if attempt < attempts {
                        let wait = self.policy.delay_after(attempt);
                        tracing::warn!(
                            file = %filename,
                            attempt,
                            wait = ?wait,
                            error = %err,
                            "publish failed, retrying"
                        );
                        if !wait.is_zero() {
                            tokio::time::sleep(wait).await;
                        }
                    }
                    last_error = Some(err);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        tracing::error!(file = %filename, attempts, error = %message, "publish exhausted retries");
        Err(NarratorError::Publish { attempts, message })
    }

    async fn publish_once(
        &self,
        filename: &str,
        folder_id: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<String> {
        let file_id = self
            .backend
            .create_file(filename, folder_id, content_type, content)
            .await?;
        self.backend
            .grant_permission(&file_id, &self.visibility)
            .await?;
        self.backend.fetch_link(&file_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn artifact(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"RIFF....WAVE").unwrap();
        path
    }

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type_for(Path::new("a/Widget_final.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("Widget_final.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("Widget.wav")), "audio/wav");
        assert_eq!(content_type_for(Path::new("no_extension")), "audio/wav");
    }

    #[test]
    fn test_default_schedule_is_non_decreasing_and_bounded() {
        let policy = RetryPolicy::default();
        let schedule = policy.schedule();

        assert_eq!(schedule.len(), 4);
        assert_eq!(
            schedule,
            vec![
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
        assert!(schedule.windows(2).all(|w| w[0] <= w[1]));
        assert!(policy.delay_after(10) <= Duration::from_secs(10));
    }

    #[test]
    fn test_immediate_policy_never_waits() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.schedule(), vec![Duration::ZERO, Duration::ZERO]);
    }

    #[tokio::test]
    async fn test_publish_succeeds_first_try() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, "Widget.wav");
        let storage = Arc::new(MemoryStorage::new());
        let publisher = MediaPublisher::new(storage.clone()).with_policy(RetryPolicy::immediate(5));

        let result = publisher.publish(&path, "folder-1").await.unwrap();

        assert_eq!(result.filename, "Widget.wav");
        assert!(result.public_url.contains("Widget.wav"));
        assert_eq!(storage.create_calls(), 1);
        let files = storage.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].folder_id, "folder-1");
        assert_eq!(files[0].content_type, "audio/wav");
        assert_eq!(files[0].visibility, Some(Visibility::Anyone));
    }

    #[tokio::test]
    async fn test_publish_retries_whole_unit_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, "Widget_final.mp4");
        // Fail the link fetch twice: create and grant must be repeated too.
        let storage = Arc::new(MemoryStorage::new().fail_links(2));
        let publisher = MediaPublisher::new(storage.clone()).with_policy(RetryPolicy::immediate(5));

        let result = publisher.publish(&path, "folder-1").await.unwrap();

        assert_eq!(result.filename, "Widget_final.mp4");
        assert_eq!(storage.create_calls(), 3);
        assert_eq!(storage.grant_calls(), 3);
    }

    #[tokio::test]
    async fn test_publish_gives_up_after_attempt_budget() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, "Widget.wav");
        let storage = Arc::new(MemoryStorage::new().fail_creates(u32::MAX));
        let publisher = MediaPublisher::new(storage.clone()).with_policy(RetryPolicy::immediate(5));

        let result = publisher.publish(&path, "folder-1").await;

        match result {
            Err(NarratorError::Publish { attempts, message }) => {
                assert_eq!(attempts, 5);
                assert!(message.contains("injected create failure"));
            }
            other => panic!("Expected Publish error, got {other:?}"),
        }
        assert_eq!(storage.create_calls(), 5);
        assert!(storage.linked_files().is_empty());
    }

    #[tokio::test]
    async fn test_private_visibility_is_passed_to_backend() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, "Widget.wav");
        let storage = Arc::new(MemoryStorage::new());
        let publisher = MediaPublisher::new(storage.clone())
            .with_policy(RetryPolicy::immediate(1))
            .with_visibility(Visibility::Private);

        publisher.publish(&path, "f").await.unwrap();

        assert_eq!(storage.files()[0].visibility, Some(Visibility::Private));
    }

    #[tokio::test]
    async fn test_missing_local_file_is_not_retried() {
        let storage = Arc::new(MemoryStorage::new());
        let publisher = MediaPublisher::new(storage.clone()).with_policy(RetryPolicy::immediate(5));

        let result = publisher
            .publish(Path::new("/nonexistent/narrator/Widget.wav"), "f")
            .await;

        assert!(matches!(result, Err(NarratorError::Io(_))));
        assert_eq!(storage.create_calls(), 0);
    }
}
