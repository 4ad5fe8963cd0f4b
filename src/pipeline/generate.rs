//! Speech generation: record text → WAV artifact → published audio.

use crate::audio::write_pcm_wav;
use crate::error::{NarratorError, Result};
use crate::pipeline::services::{Services, run_blocking};
use crate::pipeline::task::{Action, TaskProgress, TaskReport, TaskState};
use crate::pipeline::workspace::TaskWorkspace;
use crate::publish::UploadResult;
use crate::record::RecordUpdate;

/// Synthesizes the record's text prompt and attaches the audio to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateSpeechTask {
    record_id: String,
}

impl GenerateSpeechTask {
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
        }
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Run to completion. The record is written once, at the very end, and
    /// only after the upload succeeded.
    pub async fn run(&self, services: &Services) -> TaskReport {
        let mut progress = TaskProgress::start(Action::GenerateAudioVideo, &self.record_id);
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
        let fields = &services.settings.fields;
        let record = services.records.get(&self.record_id).await?;
        let missing = |field: &str| NarratorError::MissingField {
            record_id: self.record_id.clone(),
            field: field.to_string(),
        };
        let text = record
            .text(&fields.text_prompt)
            .ok_or_else(|| missing(&fields.text_prompt))?
            .to_string();
        let subject = record
            .text(&fields.subject_name)
            .ok_or_else(|| missing(&fields.subject_name))?
            .to_string();
        progress.advance(TaskState::Fetched);

        let workspace = TaskWorkspace::create(&services.settings.work_root, &self.record_id)?;
        let artifact = workspace.artifact(&format!("{subject}.wav"));
        let synthesizer = services.synthesizer.clone();
        let beam_width = services.settings.beam_width;
        let wav_path = artifact.clone();
        let bytes = run_blocking(move || {
            let pcm = synthesizer.synthesize(&text, beam_width)?;
            write_pcm_wav(&wav_path, &pcm, synthesizer.sample_rate())?;
            Ok(pcm.len())
        })
        .await?;
        tracing::debug!(
            record_id = %self.record_id,
            model = services.synthesizer.model_name(),
            bytes,
            "synthesized speech"
        );
        progress.advance(TaskState::Processed);

        let upload = services
            .publisher
            .publish(&artifact, &services.settings.folder_id)
            .await?;
        progress.advance(TaskState::Published);

        let update = RecordUpdate::new()
            .attachment(&fields.audio, &upload)
            .flag(&fields.audio_complete, true);
        services.records.update(&self.record_id, update).await?;
        Ok(upload)
    }
}
