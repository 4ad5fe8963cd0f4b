use crate::defaults;
use crate::error::{NarratorError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for text-to-speech synthesis.
///
/// Implementations block for the duration of inference; callers on an async
/// runtime run them via `spawn_blocking`.
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into raw 16-bit little-endian mono PCM.
    ///
    /// # Arguments
    /// * `text` - Non-empty input text
    /// * `beam_width` - Decoder beam width (positive)
    ///
    /// # Returns
    /// PCM bytes at [`sample_rate`](Self::sample_rate), or `ModelInference`
    fn synthesize(&self, text: &str, beam_width: u32) -> Result<Vec<u8>>;

    /// Get the name of the model
    fn model_name(&self) -> &str;

    /// Sample rate of the produced PCM in Hz
    fn sample_rate(&self) -> u32;
}

impl<T: SpeechSynthesizer + ?Sized> SpeechSynthesizer for Arc<T> {
    fn synthesize(&self, text: &str, beam_width: u32) -> Result<Vec<u8>> {
        (**self).synthesize(text, beam_width)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }
}

/// Collapse whitespace and drop control characters.
///
/// Fails with `ModelInference` when nothing speakable remains.
pub fn normalize_text(text: &str) -> Result<String> {
    let normalized = text
        .split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if normalized.chars().any(char::is_alphanumeric) {
        Ok(normalized)
    } else {
        Err(NarratorError::ModelInference {
            message: "input normalizes to an empty sequence".to_string(),
        })
    }
}

/// Mock synthesizer for testing
///
/// Emits a deterministic waveform: a tenth of a second per character, with
/// an amplitude derived from the character code.
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    model_name: String,
    sample_rate: u32,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockSynthesizer {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            sample_rate: defaults::SPEECH_SAMPLE_RATE,
            should_fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Configure the mock to fail on synthesize
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Number of `synthesize` calls so far (shared between clones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpeechSynthesizer for MockSynthesizer {
    fn synthesize(&self, text: &str, beam_width: u32) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(NarratorError::ModelInference {
                message: "mock synthesis failure".to_string(),
            });
        }
        if beam_width == 0 {
            return Err(NarratorError::ModelInference {
                message: "beam width must be positive".to_string(),
            });
        }
        let text = normalize_text(text)?;
        let per_char = (self.sample_rate / 10) as usize;
        let mut pcm = Vec::with_capacity(text.len() * per_char * 2);
        for c in text.chars() {
            let amplitude = ((c as u32 % 64) * 256) as i16;
            for i in 0..per_char {
                let sample = if i % 2 == 0 { amplitude } else { -amplitude };
                pcm.extend_from_slice(&sample.to_le_bytes());
            }
        }
        Ok(pcm)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
