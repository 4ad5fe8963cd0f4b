use crate::defaults;
use crate::error::{NarratorError, Result};
use crate::publish::{RetryPolicy, Visibility};
use crate::record::FieldNames;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub records: RecordsConfig,
    pub publish: PublishConfig,
    pub tts: TtsConfig,
    pub stt: SttConfig,
    pub merge: MergeConfig,
}

/// Trigger endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub workers: usize,
    pub capacity: usize,
    /// Enqueue the merge task for a record once its speech task succeeds.
    pub chain_merge: bool,
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordsConfig {
    pub base_url: String,
    pub base_id: String,
    pub table: String,
    pub api_key: Option<String>,
    pub fields: FieldNames,
}

/// Upload destination configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PublishConfig {
    pub folder_id: String,
    pub access_token: Option<String>,
    pub base_url: String,
    pub upload_url: String,
    /// One of "private", "domain" or "anyone".
    pub visibility: String,
    /// Required when `visibility = "domain"`.
    pub domain: Option<String>,
    pub retry_attempts: u32,
    #[serde(with = "duration_str")]
    pub retry_base: Duration,
    #[serde(with = "duration_str")]
    pub retry_max: Duration,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub beam_width: u32,
    pub sample_rate: u32,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub model_path: PathBuf,
    pub language: String,
    pub threads: Option<usize>,
    pub confidence_threshold: f32,
}

/// Audio/video merge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MergeConfig {
    pub interpolate: bool,
    pub interpolation_factor: u32,
    pub font_size: u32,
    pub work_dir: Option<PathBuf>,
    /// ffmpeg executable (name looked up on `PATH`, or a full path).
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::BIND_ADDR.to_string(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: defaults::WORKERS,
            capacity: defaults::QUEUE_CAPACITY,
            chain_merge: false,
        }
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::RECORDS_BASE_URL.to_string(),
            base_id: String::new(),
            table: String::new(),
            api_key: None,
            fields: FieldNames::default(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            folder_id: String::new(),
            access_token: None,
            base_url: defaults::DRIVE_BASE_URL.to_string(),
            upload_url: defaults::DRIVE_UPLOAD_URL.to_string(),
            visibility: "anyone".to_string(),
            domain: None,
            retry_attempts: defaults::PUBLISH_ATTEMPTS,
            retry_base: Duration::from_secs(defaults::PUBLISH_BACKOFF_MIN_SECS),
            retry_max: Duration::from_secs(defaults::PUBLISH_BACKOFF_MAX_SECS),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::TTS_BASE_URL.to_string(),
            api_key: None,
            model: defaults::TTS_MODEL.to_string(),
            voice: defaults::TTS_VOICE.to_string(),
            beam_width: defaults::BEAM_WIDTH,
            sample_rate: defaults::SPEECH_SAMPLE_RATE,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-base.bin"),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            threads: None,
            confidence_threshold: defaults::CONFIDENCE_THRESHOLD,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            interpolate: true,
            interpolation_factor: defaults::INTERPOLATION_FACTOR,
            font_size: defaults::SUBTITLE_FONT_SIZE,
            work_dir: None,
            ffmpeg: PathBuf::from(defaults::FFMPEG_BIN),
            ffprobe: PathBuf::from(defaults::FFPROBE_BIN),
        }
    }
}

impl PublishConfig {
    /// Resolve the configured visibility policy.
    pub fn visibility(&self) -> Result<Visibility> {
        match self.visibility.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(Visibility::Private),
            "anyone" | "public" => Ok(Visibility::Anyone),
            "domain" => match self.domain.as_deref().map(str::trim) {
                Some(domain) if !domain.is_empty() => Ok(Visibility::Domain(domain.to_string())),
                _ => Err(NarratorError::ConfigInvalidValue {
                    key: "publish.domain".to_string(),
                    message: "required when visibility = \"domain\"".to_string(),
                }),
            },
            other => Err(NarratorError::ConfigInvalidValue {
                key: "publish.visibility".to_string(),
                message: format!("unknown policy '{other}' (expected private, domain or anyone)"),
            }),
        }
    }

    /// Retry policy for the upload unit.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            min_delay: self.retry_base,
            max_delay: self.retry_max,
        }
    }
}

impl MergeConfig {
    /// Root directory under which per-run artifact directories are created.
    pub fn work_root(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("narrator"))
    }

    /// Effective interpolation factor (1 when interpolation is disabled).
    pub fn effective_factor(&self) -> u32 {
        if self.interpolate {
            self.interpolation_factor
        } else {
            1
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NarratorError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                NarratorError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(NarratorError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - NARRATOR_BIND → server.bind
    /// - NARRATOR_RECORDS_API_KEY → records.api_key
    /// - NARRATOR_RECORDS_BASE_ID → records.base_id
    /// - NARRATOR_RECORDS_TABLE → records.table
    /// - NARRATOR_PUBLISH_FOLDER_ID → publish.folder_id
    /// - NARRATOR_PUBLISH_ACCESS_TOKEN → publish.access_token
    /// - NARRATOR_TTS_API_KEY → tts.api_key
    /// - NARRATOR_STT_MODEL_PATH → stt.model_path
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(bind) = env_value("NARRATOR_BIND") {
            self.server.bind = bind;
        }
        if let Some(key) = env_value("NARRATOR_RECORDS_API_KEY") {
            self.records.api_key = Some(key);
        }
        if let Some(base) = env_value("NARRATOR_RECORDS_BASE_ID") {
            self.records.base_id = base;
        }
        if let Some(table) = env_value("NARRATOR_RECORDS_TABLE") {
            self.records.table = table;
        }
        if let Some(folder) = env_value("NARRATOR_PUBLISH_FOLDER_ID") {
            self.publish.folder_id = folder;
        }
        if let Some(token) = env_value("NARRATOR_PUBLISH_ACCESS_TOKEN") {
            self.publish.access_token = Some(token);
        }
        if let Some(key) = env_value("NARRATOR_TTS_API_KEY") {
            self.tts.api_key = Some(key);
        }
        if let Some(path) = env_value("NARRATOR_STT_MODEL_PATH") {
            self.stt.model_path = PathBuf::from(path);
        }
        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> NarratorError {
            NarratorError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            }
        }

        if !(0.0..=1.0).contains(&self.stt.confidence_threshold) {
            return Err(invalid("stt.confidence_threshold", "must be within [0, 1]"));
        }
        if self.merge.interpolation_factor < 1 {
            return Err(invalid("merge.interpolation_factor", "must be at least 1"));
        }
        if self.tts.beam_width == 0 {
            return Err(invalid("tts.beam_width", "must be positive"));
        }
        if self.tts.sample_rate == 0 {
            return Err(invalid("tts.sample_rate", "must be positive"));
        }
        if self.queue.workers == 0 {
            return Err(invalid("queue.workers", "must be positive"));
        }
        if self.queue.capacity == 0 {
            return Err(invalid("queue.capacity", "must be positive"));
        }
        if self.publish.retry_attempts == 0 {
            return Err(invalid("publish.retry_attempts", "must be positive"));
        }
        if self.publish.retry_base > self.publish.retry_max {
            return Err(invalid(
                "publish.retry_base",
                "must not exceed publish.retry_max",
            ));
        }
        self.publish.visibility()?;
        Ok(())
    }

    /// Copy with credentials masked, for display.
    pub fn redacted(&self) -> Self {
        fn mask(secret: &Option<String>) -> Option<String> {
            secret.as_ref().map(|_| "********".to_string())
        }
        let mut shown = self.clone();
        shown.records.api_key = mask(&self.records.api_key);
        shown.publish.access_token = mask(&self.publish.access_token);
        shown.tts.api_key = mask(&self.tts.api_key);
        shown
    }

    /// Serialize to pretty TOML (for `config show` / `config init`).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| NarratorError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/narrator/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("narrator")
            .join("config.toml")
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Durations written as humantime strings ("4s", "1m30s").
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}
