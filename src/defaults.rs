//! Default configuration constants for narrator.
//!
//! Shared between `config`, the task implementations and their tests so the
//! documented defaults live in one place.

/// Beam width passed to the speech synthesizer.
pub const BEAM_WIDTH: u32 = 5;

/// Sample rate of synthesized speech in Hz.
///
/// Raw `pcm` output of the OpenAI speech endpoint is 24 kHz mono s16le.
pub const SPEECH_SAMPLE_RATE: u32 = 24000;

/// Sample rate expected by the transcriber in Hz.
pub const TRANSCRIBE_SAMPLE_RATE: u32 = 16000;

/// Minimum confidence for a transcript segment to be kept.
pub const CONFIDENCE_THRESHOLD: f32 = 0.85;

/// Frame-rate multiplier applied by the motion interpolator.
pub const INTERPOLATION_FACTOR: u32 = 2;

/// Caption font size in points.
pub const SUBTITLE_FONT_SIZE: u32 = 24;

/// Caption font family.
pub const SUBTITLE_FONT: &str = "Arial";

/// Default language code for transcription ("auto" = detect).
pub const DEFAULT_LANGUAGE: &str = "auto";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Publish retry budget: total attempts including the first.
pub const PUBLISH_ATTEMPTS: u32 = 5;

/// Lower bound of the exponential publish backoff, in seconds.
pub const PUBLISH_BACKOFF_MIN_SECS: u64 = 4;

/// Upper bound of the exponential publish backoff, in seconds.
pub const PUBLISH_BACKOFF_MAX_SECS: u64 = 10;

/// Number of queue workers.
pub const WORKERS: usize = 2;

/// Maximum number of queued, not yet started tasks.
pub const QUEUE_CAPACITY: usize = 64;

/// Trigger endpoint bind address.
pub const BIND_ADDR: &str = "0.0.0.0:5000";

/// Record store REST base URL.
pub const RECORDS_BASE_URL: &str = "https://api.airtable.com/v0";

/// Google Drive metadata API base URL.
pub const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Google Drive media upload base URL.
pub const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";

/// OpenAI-compatible speech API base URL.
pub const TTS_BASE_URL: &str = "https://api.openai.com/v1";

/// Speech model name.
pub const TTS_MODEL: &str = "tts-1";

/// Speech voice name.
pub const TTS_VOICE: &str = "alloy";

/// Timeout for a single HTTP request to an external service, in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 120;

/// Time allowed to establish a connection for a media transfer, in seconds.
pub const TRANSFER_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Longest stall between two reads of a media transfer, in seconds.
///
/// Media bodies have no total deadline; only an idle connection fails.
pub const TRANSFER_READ_TIMEOUT_SECS: u64 = 60;

/// ffmpeg executable looked up on `PATH`.
pub const FFMPEG_BIN: &str = "ffmpeg";

/// ffprobe executable looked up on `PATH`.
pub const FFPROBE_BIN: &str = "ffprobe";

/// Report the GPU backend compiled into this build.
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else {
        "CPU"
    }
}
