//! OpenAI-compatible speech endpoint (`POST {base}/audio/speech`).

use crate::config::TtsConfig;
use crate::defaults;
use crate::error::{NarratorError, Result};
use crate::tts::synthesizer::{SpeechSynthesizer, normalize_text};
use std::time::Duration;

/// Synthesizer backed by a remote speech service returning raw PCM.
///
/// The request carries `response_format = "pcm"` plus the beam width, which
/// self-hosted Tacotron-style servers honour and hosted APIs ignore.
#[derive(Debug)]
pub struct HttpSynthesizer {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
    sample_rate: u32,
}

impl HttpSynthesizer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        sample_rate: u32,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(defaults::HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| NarratorError::ModelInference {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            voice: voice.into(),
            sample_rate,
        })
    }

    pub fn from_config(config: &TtsConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            config.api_key.clone(),
            &config.model,
            &config.voice,
            config.sample_rate,
        )
    }
}

impl SpeechSynthesizer for HttpSynthesizer {
    fn synthesize(&self, text: &str, beam_width: u32) -> Result<Vec<u8>> {
        let text = normalize_text(text)?;
        if beam_width == 0 {
            return Err(NarratorError::ModelInference {
                message: "beam width must be positive".to_string(),
            });
        }

        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "pcm",
            "beam_width": beam_width,
        });
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let res = request.send().map_err(|e| NarratorError::ModelInference {
            message: format!("request to {url} failed: {e}"),
        })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(NarratorError::ModelInference {
                message: format!("TTS API error {status}: {body}"),
            });
        }
        let bytes = res.bytes().map_err(|e| NarratorError::ModelInference {
            message: e.to_string(),
        })?;
        if bytes.len() < 2 {
            return Err(NarratorError::ModelInference {
                message: "TTS API returned no audio".to_string(),
            });
        }
        tracing::debug!(model = %self.model, bytes = bytes.len(), "synthesized speech");
        Ok(bytes.to_vec())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
