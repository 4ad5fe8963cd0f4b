//! Final video assembly: audio track, interpolated frames, burned-in captions.

use crate::error::{NarratorError, Result};
use crate::stt::transcriber::TranscriptSegment;
use crate::video::ffmpeg::{EncodeSettings, FfmpegTools, VideoDecoder, VideoEncoder};
use crate::video::interpolate::MotionInterpolator;
use crate::video::subtitle::SubtitleCompositor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Caption file written next to the output; the encoder runs in that
/// directory so the filtergraph never sees the subject-derived path.
pub const CAPTIONS_FILE: &str = "captions.srt";

/// Inputs of one composition.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeRequest {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub segments: Vec<TranscriptSegment>,
    /// Frame-rate multiplier; 1 disables interpolation.
    pub factor: u32,
    pub output: PathBuf,
}

/// What a composition produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeReport {
    pub frames_in: u64,
    pub frames_out: u64,
    pub fps: f64,
    pub captions: usize,
}

/// Produces the final narrated video.
///
/// Blocking; run from `spawn_blocking` on an async runtime.
pub trait MediaComposer: Send + Sync {
    fn compose(&self, request: &ComposeRequest) -> Result<ComposeReport>;

    fn name(&self) -> &str;
}

impl<T: MediaComposer + ?Sized> MediaComposer for Arc<T> {
    fn compose(&self, request: &ComposeRequest) -> Result<ComposeReport> {
        (**self).compose(request)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Composer driving ffmpeg: decode, interpolate, encode with audio and
/// captions in a single streaming pass.
#[derive(Debug, Default)]
pub struct FfmpegComposer {
    interpolator: MotionInterpolator,
    subtitles: SubtitleCompositor,
    tools: FfmpegTools,
}

impl FfmpegComposer {
    pub fn new(interpolator: MotionInterpolator, subtitles: SubtitleCompositor) -> Self {
        Self {
            interpolator,
            subtitles,
            tools: FfmpegTools::default(),
        }
    }

    /// Use specific ffmpeg/ffprobe executables.
    pub fn with_tools(mut self, tools: FfmpegTools) -> Self {
        self.tools = tools;
        self
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

impl MediaComposer for FfmpegComposer {
    fn compose(&self, request: &ComposeRequest) -> Result<ComposeReport> {
        let factor = request.factor.max(1);
        let captions = self.subtitles.compose(&request.segments);
        let output = absolute(&request.output)?;
        let work_dir = output
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| NarratorError::Encoding {
                message: format!("{} has no parent directory", output.display()),
            })?;
        captions.write_srt(&work_dir.join(CAPTIONS_FILE))?;

        let mut decoder = VideoDecoder::open(&self.tools, &absolute(&request.video)?)?;
        let info = decoder.info();
        let fps = info.fps * factor as f64;
        let settings = EncodeSettings {
            width: info.width,
            height: info.height,
            fps,
            audio: absolute(&request.audio)?,
            video_filter: (!captions.is_empty())
                .then(|| self.subtitles.burn_in_filter(Path::new(CAPTIONS_FILE))),
            output,
            working_dir: Some(work_dir),
        };
        let mut encoder = VideoEncoder::start(&self.tools, &settings)?;

        let Some(mut previous) = decoder.read_frame()? else {
            return Err(NarratorError::Decoding {
                message: format!("{} contains no frames", request.video.display()),
            });
        };
        encoder.write_frame(&previous)?;
        while let Some(next) = decoder.read_frame()? {
            for frame in self.interpolator.interpolate_pair(&previous, &next, factor) {
                encoder.write_frame(&frame)?;
            }
            previous = next;
        }

        let frames_in = decoder.frames_read();
        let frames_out = encoder.finish()?;
        tracing::info!(
            frames_in,
            frames_out,
            fps,
            captions = captions.len(),
            output = %request.output.display(),
            "composed final video"
        );
        Ok(ComposeReport {
            frames_in,
            frames_out,
            fps,
            captions: captions.len(),
        })
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Mock composer for testing
///
/// Writes a placeholder file at the requested output and records requests.
#[derive(Debug, Clone, Default)]
pub struct MockComposer {
    should_fail: bool,
    requests: Arc<Mutex<Vec<ComposeRequest>>>,
}

impl MockComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail on compose
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Requests received so far (shared between clones).
    pub fn requests(&self) -> Vec<ComposeRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl MediaComposer for MockComposer {
    fn compose(&self, request: &ComposeRequest) -> Result<ComposeReport> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if self.should_fail {
            return Err(NarratorError::Encoding {
                message: "mock composer failure".to_string(),
            });
        }
        std::fs::write(&request.output, b"mock mp4")?;
        Ok(ComposeReport {
            frames_in: 1,
            frames_out: 1,
            fps: 30.0 * request.factor.max(1) as f64,
            captions: request.segments.len(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
