//! Explicitly constructed collaborators shared by every task run.

use crate::config::Config;
use crate::error::{NarratorError, Result};
use crate::fetch::{HttpFetcher, MediaFetcher};
use crate::publish::{GoogleDriveBackend, MediaPublisher};
use crate::record::{AirtableGateway, FieldNames, RecordGateway};
use crate::stt::{Transcriber, WhisperConfig, WhisperTranscriber};
use crate::tts::{HttpSynthesizer, SpeechSynthesizer};
use crate::video::ffmpeg::FfmpegTools;
use crate::video::{CaptionStyle, FfmpegComposer, MediaComposer, MotionInterpolator, SubtitleCompositor};
use std::path::PathBuf;
use std::sync::Arc;

/// Per-task parameters taken from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSettings {
    pub fields: FieldNames,
    pub folder_id: String,
    pub beam_width: u32,
    pub confidence_threshold: f32,
    /// Frame-rate multiplier for merges; 1 disables interpolation.
    pub interpolation_factor: u32,
    /// Directory holding per-run artifact directories.
    pub work_root: PathBuf,
}

impl TaskSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fields: config.records.fields.clone(),
            folder_id: config.publish.folder_id.clone(),
            beam_width: config.tts.beam_width,
            confidence_threshold: config.stt.confidence_threshold,
            interpolation_factor: config.merge.effective_factor(),
            work_root: config.merge.work_root(),
        }
    }
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Service objects passed to each task invocation.
#[derive(Clone)]
pub struct Services {
    pub records: Arc<dyn RecordGateway>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub publisher: Arc<MediaPublisher>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub composer: Arc<dyn MediaComposer>,
    pub settings: TaskSettings,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("records", &self.records.name())
            .field("synthesizer", &self.synthesizer.model_name())
            .field("transcriber", &self.transcriber.model_name())
            .field("publisher", &self.publisher)
            .field("fetcher", &self.fetcher.name())
            .field("composer", &self.composer.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Services {
    /// Build the production backends described by `config`.
    ///
    /// Fails when credentials are missing or the transcription model file
    /// does not exist.
    pub fn from_config(config: &Config) -> Result<Self> {
        let records = AirtableGateway::from_config(&config.records)?;
        let synthesizer = HttpSynthesizer::from_config(&config.tts)?;
        let transcriber = WhisperTranscriber::new(WhisperConfig::from(config.stt.clone()))?;
        let publisher = MediaPublisher::new(Arc::new(GoogleDriveBackend::from_config(
            &config.publish,
        )?))
        .with_policy(config.publish.retry_policy())
        .with_visibility(config.publish.visibility()?);
        let composer = FfmpegComposer::new(
            MotionInterpolator::default(),
            SubtitleCompositor::new(CaptionStyle {
                font_size: config.merge.font_size,
                ..CaptionStyle::default()
            }),
        )
        .with_tools(FfmpegTools::from_config(&config.merge));

        let services = Self {
            records: Arc::new(records),
            synthesizer: Arc::new(synthesizer),
            transcriber: Arc::new(transcriber),
            publisher: Arc::new(publisher),
            fetcher: Arc::new(HttpFetcher::new()?),
            composer: Arc::new(composer),
            settings: TaskSettings::from_config(config),
        };
        tracing::debug!(?services, "services ready");
        Ok(services)
    }
}

/// Run a blocking model or media call on the runtime's blocking pool.
pub(crate) async fn run_blocking<T, F>(job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| NarratorError::Other(format!("blocking job did not complete: {e}")))?
}

/// Services wired to in-memory backends and mocks.
#[cfg(test)]
pub(crate) fn mock_services(
    records: Arc<crate::record::InMemoryGateway>,
    storage: Arc<crate::publish::MemoryStorage>,
    work_root: &std::path::Path,
) -> Services {
    use crate::fetch::MockFetcher;
    use crate::publish::RetryPolicy;
    use crate::stt::MockTranscriber;
    use crate::tts::MockSynthesizer;
    use crate::video::MockComposer;

    Services {
        records,
        synthesizer: Arc::new(MockSynthesizer::new("mock-tts")),
        transcriber: Arc::new(MockTranscriber::new("mock-stt")),
        publisher: Arc::new(MediaPublisher::new(storage).with_policy(RetryPolicy::immediate(5))),
        fetcher: Arc::new(MockFetcher::new()),
        composer: Arc::new(MockComposer::new()),
        settings: TaskSettings {
            folder_id: "folder-1".to_string(),
            work_root: work_root.to_path_buf(),
            ..TaskSettings::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_follow_config() {
        let mut config = Config::default();
        config.publish.folder_id = "folder-1".to_string();
        config.merge.interpolate = false;
        config.stt.confidence_threshold = 0.5;

        let settings = TaskSettings::from_config(&config);

        assert_eq!(settings.folder_id, "folder-1");
        assert_eq!(settings.interpolation_factor, 1);
        assert_eq!(settings.confidence_threshold, 0.5);
        assert_eq!(settings.beam_width, 5);
        assert_eq!(settings.fields.audio, "Audio ");
    }

    #[test]
    fn test_from_config_requires_credentials() {
        assert!(Services::from_config(&Config::default()).is_err());
    }

    #[tokio::test]
    async fn test_run_blocking_propagates_errors() {
        let ok = run_blocking(|| Ok(2 + 2)).await.unwrap();
        assert_eq!(ok, 4);

        let err = run_blocking::<(), _>(|| {
            Err(NarratorError::Encoding {
                message: "boom".to_string(),
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, NarratorError::Encoding { .. }));
    }
}
