//! Audio/video merge: download inputs, caption, interpolate, encode, publish.

use crate::error::{NarratorError, Result};
use crate::pipeline::services::{Services, run_blocking};
use crate::pipeline::task::{Action, TaskProgress, TaskReport, TaskState};
use crate::pipeline::workspace::TaskWorkspace;
use crate::publish::UploadResult;
use crate::record::RecordUpdate;
use crate::stt::transcribe_file;
use crate::video::ComposeRequest;

/// Merges a record's narrated audio into its source video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeAudioVideoTask {
    record_id: String,
}

impl MergeAudioVideoTask {
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
        }
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub async fn run(&self, services: &Services) -> TaskReport {
        let mut progress = TaskProgress::start(Action::MergeAudioVideo, &self.record_id);
        match self.execute(services, &mut progress).await {
            Ok(upload) => progress.succeed(upload),
            Err(e) => progress.fail(&e),
        }
    }

    async fn execute(
        &self,
        services: &Services,
        progress: &mut TaskProgress,
    ) -> Result<UploadResult> {
        let settings = &services.settings;
        let fields = &settings.fields;
        let record = services.records.get(&self.record_id).await?;
        let missing = |field: &str| NarratorError::MissingField {
            record_id: self.record_id.clone(),
            field: field.to_string(),
        };
        let subject = record
            .text(&fields.subject_name)
            .ok_or_else(|| missing(&fields.subject_name))?
            .to_string();
        let audio = record
            .first_attachment(&fields.audio)
            .ok_or_else(|| missing(&fields.audio))?;
        let video = record
            .first_attachment(&fields.video)
            .ok_or_else(|| missing(&fields.video))?;
        progress.advance(TaskState::Fetched);

        let workspace = TaskWorkspace::create(&settings.work_root, &self.record_id)?;
        let audio_path = workspace.artifact(&format!("{subject}_audio.wav"));
        let video_path = workspace.artifact(&format!("{subject}_video.mp4"));
        services.fetcher.fetch(&audio.url, &audio_path).await?;
        services.fetcher.fetch(&video.url, &video_path).await?;

        let transcriber = services.transcriber.clone();
        let threshold = settings.confidence_threshold;
        let transcript_audio = audio_path.clone();
        let segments =
            run_blocking(move || transcribe_file(&*transcriber, &transcript_audio, threshold))
                .await?;

        let request = ComposeRequest {
            video: video_path,
            audio: audio_path,
            segments,
            factor: settings.interpolation_factor,
            output: workspace.artifact(&format!("{subject}_final.mp4")),
        };
        let output = request.output.clone();
        let composer = services.composer.clone();
        let report = run_blocking(move || composer.compose(&request)).await?;
        tracing::debug!(
            record_id = %self.record_id,
            composer = services.composer.name(),
            frames_in = report.frames_in,
            frames_out = report.frames_out,
            captions = report.captions,
            "composed merge output"
        );
        progress.advance(TaskState::Processed);

        let upload = services
            .publisher
            .publish(&output, &settings.folder_id)
            .await?;
        progress.advance(TaskState::Published);

        let update = RecordUpdate::new()
            .attachment(&fields.merged, &upload)
            .flag(&fields.merge_complete, true);
        services.records.update(&self.record_id, update).await?;
        Ok(upload)
    }
}
