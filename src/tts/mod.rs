//! Text-to-speech.

pub mod http;
pub mod synthesizer;

pub use http::HttpSynthesizer;
pub use synthesizer::{MockSynthesizer, SpeechSynthesizer, normalize_text};
