//! Video processing: decode, interpolate, caption, encode.

pub mod compose;
pub mod ffmpeg;
pub mod interpolate;
pub mod subtitle;

pub use compose::{ComposeReport, ComposeRequest, FfmpegComposer, MediaComposer, MockComposer};
pub use interpolate::{Frame, Interpolated, MotionInterpolator};
pub use subtitle::{CaptionStyle, CaptionTrack, SubtitleCompositor};
