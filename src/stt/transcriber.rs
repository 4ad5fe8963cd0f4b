use crate::audio::wav::WavClip;
use crate::error::{NarratorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A timestamped unit of recognized speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    pub text: String,
    /// Confidence in `[0, 1]`; `None` when the model reports none.
    pub confidence: Option<f32>,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            confidence,
        }
    }

    /// Segments without a confidence score pass every threshold.
    pub fn passes(&self, threshold: f32) -> bool {
        self.confidence.is_none_or(|c| c >= threshold)
    }
}

/// Trait for speech-to-text transcription.
///
/// This trait allows swapping implementations (real Whisper vs mock).
pub trait Transcriber: Send + Sync {
    /// Transcribe audio samples to timed segments.
    ///
    /// # Arguments
    /// * `audio` - Audio samples as 16-bit PCM at 16kHz mono
    fn transcribe(&self, audio: &[i16]) -> Result<Vec<TranscriptSegment>>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;

    /// Check if the transcriber is ready
    fn is_ready(&self) -> bool;
}

/// Implement Transcriber for Arc<T> to allow sharing across tasks.
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[i16]) -> Result<Vec<TranscriptSegment>> {
        (**self).transcribe(audio)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Keep segments at or above `threshold`, ordered by start time.
pub fn filter_segments(segments: Vec<TranscriptSegment>, threshold: f32) -> Vec<TranscriptSegment> {
    let mut kept: Vec<_> = segments
        .into_iter()
        .filter(|segment| segment.passes(threshold))
        .filter(|segment| !segment.text.trim().is_empty())
        .collect();
    kept.sort_by(|a, b| a.start.total_cmp(&b.start));
    kept
}

/// Transcribe a WAV file and filter the result by confidence.
///
/// Unreadable or corrupt audio fails with `Transcription`.
pub fn transcribe_file(
    transcriber: &dyn Transcriber,
    audio_path: &Path,
    threshold: f32,
) -> Result<Vec<TranscriptSegment>> {
    let clip = WavClip::open(audio_path).map_err(|e| NarratorError::Transcription {
        message: e.to_string(),
    })?;
    let segments = transcriber.transcribe(clip.samples())?;
    let total = segments.len();
    let kept = filter_segments(segments, threshold);
    tracing::debug!(
        model = transcriber.model_name(),
        total,
        kept = kept.len(),
        threshold,
        "transcribed audio"
    );
    Ok(kept)
}

/// Mock transcriber for testing
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    segments: Option<Vec<TranscriptSegment>>,
    should_fail: bool,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    ///
    /// By default one confident segment spans the whole input.
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            segments: None,
            should_fail: false,
        }
    }

    /// Configure the mock to return specific segments
    pub fn with_segments(mut self, segments: Vec<TranscriptSegment>) -> Self {
        self.segments = Some(segments);
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, audio: &[i16]) -> Result<Vec<TranscriptSegment>> {
        if self.should_fail {
            return Err(NarratorError::Transcription {
                message: "mock transcription failure".to_string(),
            });
        }
        match &self.segments {
            Some(segments) => Ok(segments.clone()),
            None => {
                let end = audio.len() as f64 / crate::defaults::TRANSCRIBE_SAMPLE_RATE as f64;
                Ok(vec![TranscriptSegment::new(
                    0.0,
                    end,
                    "mock transcription",
                    Some(0.99),
                )])
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}
