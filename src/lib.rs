//! narrator - Narrated, subtitled product videos from record-store rows
//!
//! A trigger endpoint queues tasks for a worker pool. Speech generation turns
//! a record's text into a WAV attachment; the merge task transcribes that
//! audio, captions and smooths the record's video, and attaches the result.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
#[cfg(feature = "cli")]
pub mod diagnostics;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod publish;
pub mod record;
pub mod server;
pub mod stt;
pub mod tts;
pub mod video;

// Collaborator seams
pub use fetch::MediaFetcher;
pub use publish::StorageBackend;
pub use record::RecordGateway;
pub use stt::Transcriber;
pub use tts::SpeechSynthesizer;
pub use video::MediaComposer;

// Pipeline
pub use pipeline::{Action, Services, TaskReport, TaskState, TriggerEvent, WorkQueue};

// Error handling
pub use error::{NarratorError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.0.1+abc1234"` when git hash is available, `"0.0.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_hash_suffix_matches_build() {
        let ver = version_string();
        match option_env!("GIT_HASH").filter(|h| !h.is_empty()) {
            Some(hash) => {
                assert_eq!(ver, format!("{}+{}", env!("CARGO_PKG_VERSION"), hash));
                assert_eq!(hash.len(), 7, "short hash expected, got: {hash}");
            }
            None => assert_eq!(ver, env!("CARGO_PKG_VERSION")),
        }
    }
}
