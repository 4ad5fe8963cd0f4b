//! Audio artifacts.

pub mod wav;

pub use wav::{WavClip, write_pcm_wav};
