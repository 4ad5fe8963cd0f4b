//! Speech-to-text.

pub mod transcriber;
pub mod whisper;

pub use transcriber::{MockTranscriber, TranscriptSegment, Transcriber, filter_segments, transcribe_file};
pub use whisper::{WhisperConfig, WhisperTranscriber};
