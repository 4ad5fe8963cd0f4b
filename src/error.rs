//! Error types for narrator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarratorError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Record store errors
    #[error("Record {record_id} is missing required field '{field}'")]
    MissingField { record_id: String, field: String },

    #[error("Record not found: {record_id}")]
    RecordNotFound { record_id: String },

    #[error("Failed to write record {record_id}: {message}")]
    RecordWrite { record_id: String, message: String },

    // Processing errors
    #[error("Speech synthesis failed: {message}")]
    ModelInference { message: String },

    #[error("Audio error: {message}")]
    Audio { message: String },

    #[error("Transcription model not found at {path}")]
    TranscriptionModelNotFound { path: String },

    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Frame interpolation failed: {message}")]
    Interpolation { message: String },

    #[error("Video decoding failed: {message}")]
    Decoding { message: String },

    #[error("Video encoding failed: {message}")]
    Encoding { message: String },

    // Transfer errors
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Publish failed after {attempts} attempt(s): {message}")]
    Publish { attempts: u32, message: String },

    // Queue errors
    #[error("Task queue error: {message}")]
    Queue { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl NarratorError {
    /// Whether retrying the same operation could plausibly succeed.
    ///
    /// Network and record-store write failures are transient; missing
    /// fields and processing failures are deterministic.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NarratorError::RecordWrite { .. }
                | NarratorError::Fetch { .. }
                | NarratorError::Publish { .. }
                | NarratorError::Io(_)
        )
    }

    /// Short machine-friendly name used in task reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            NarratorError::ConfigFileNotFound { .. }
            | NarratorError::ConfigParse { .. }
            | NarratorError::ConfigInvalidValue { .. }
            | NarratorError::Config(_) => "config",
            NarratorError::MissingField { .. } => "missing_field",
            NarratorError::RecordNotFound { .. } => "record_not_found",
            NarratorError::RecordWrite { .. } => "record_write",
            NarratorError::ModelInference { .. } => "model_inference",
            NarratorError::Audio { .. } => "audio",
            NarratorError::TranscriptionModelNotFound { .. }
            | NarratorError::Transcription { .. } => "transcription",
            NarratorError::Interpolation { .. } => "interpolation",
            NarratorError::Decoding { .. } => "decoding",
            NarratorError::Encoding { .. } => "encoding",
            NarratorError::Fetch { .. } => "fetch",
            NarratorError::Publish { .. } => "publish",
            NarratorError::Queue { .. } => "queue",
            NarratorError::Io(_) => "io",
            NarratorError::Other(_) => "other",
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, NarratorError>;
