//! ffprobe/ffmpeg process wrappers.
//!
//! Frames cross the process boundary as raw `rgb24` over stdin/stdout pipes.
//! stderr of every long-running ffmpeg is drained on its own thread so a
//! chatty process never stalls on a full pipe.

use crate::config::MergeConfig;
use crate::defaults;
use crate::error::{NarratorError, Result};
use crate::video::interpolate::Frame;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Lines of ffmpeg stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 8;

/// Quiet logging flags passed to every ffmpeg run.
const QUIET_ARGS: [&str; 4] = ["-nostats", "-hide_banner", "-loglevel", "error"];

/// Locations of the ffmpeg and ffprobe executables.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from(defaults::FFMPEG_BIN),
            ffprobe: PathBuf::from(defaults::FFPROBE_BIN),
        }
    }
}

impl FfmpegTools {
    /// Relative paths such as `bin/ffmpeg` are anchored to the current
    /// directory; the encoder runs elsewhere. Bare names stay `PATH` lookups.
    pub fn from_config(config: &MergeConfig) -> Self {
        Self {
            ffmpeg: anchor(&config.ffmpeg),
            ffprobe: anchor(&config.ffprobe),
        }
    }
}

fn anchor(program: &Path) -> PathBuf {
    if program.components().count() > 1 {
        std::path::absolute(program).unwrap_or_else(|_| program.to_path_buf())
    } else {
        program.to_path_buf()
    }
}

/// Background reader keeping the last lines a child wrote to stderr.
struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    reader: Option<JoinHandle<()>>,
}

impl StderrTail {
    fn spawn(stderr: Option<ChildStderr>) -> Self {
        let lines = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let reader = stderr.and_then(|pipe| {
            let sink = lines.clone();
            std::thread::Builder::new()
                .name("ffmpeg-stderr".to_string())
                .spawn(move || {
                    let mut reader = BufReader::new(pipe);
                    let mut raw = Vec::new();
                    loop {
                        raw.clear();
                        match reader.read_until(b'\n', &mut raw) {
                            Ok(0) | Err(_) => break,
                            Ok(_) => {}
                        }
                        let text = String::from_utf8_lossy(&raw);
                        for line in text.split('\r').map(str::trim).filter(|l| !l.is_empty()) {
                            if let Ok(mut tail) = sink.lock() {
                                if tail.len() == STDERR_TAIL_LINES {
                                    tail.pop_front();
                                }
                                tail.push_back(line.to_string());
                            }
                        }
                    }
                })
                .ok()
        });
        Self { lines, reader }
    }

    /// Wait for the pipe to close and return what was kept, joined by ` | `.
    fn finish(&mut self) -> String {
        if let Some(reader) = self.reader.take()
            && reader.join().is_err()
        {
            tracing::warn!("ffmpeg stderr reader panicked");
        }
        self.lines
            .lock()
            .map(|tail| tail.iter().map(String::as_str).collect::<Vec<_>>().join(" | "))
            .unwrap_or_default()
    }
}

/// Stream properties reported by ffprobe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Dimensions and frame rate of the first video stream of a file.
pub fn stream_info(tools: &FfmpegTools, video_path: &Path) -> Result<VideoInfo> {
    let output = Command::new(&tools.ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate",
            "-of",
            "csv=p=0",
        ])
        .arg(video_path)
        .output()
        .map_err(|e| NarratorError::Decoding {
            message: format!("Failed to run ffprobe: {e}"),
        })?;

    if !output.status.success() {
        return Err(NarratorError::Decoding {
            message: format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    parse_stream_info(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `width,height,num/den` as printed by ffprobe.
pub fn parse_stream_info(stdout: &str) -> Result<VideoInfo> {
    let line = stdout.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let parts: Vec<&str> = line.trim().split(',').collect();
    let invalid = |what: &str| NarratorError::Decoding {
        message: format!("Unexpected ffprobe output ({what}): {}", stdout.trim()),
    };
    if parts.len() < 3 {
        return Err(invalid("field count"));
    }

    let width: u32 = parts[0].parse().map_err(|_| invalid("width"))?;
    let height: u32 = parts[1].parse().map_err(|_| invalid("height"))?;
    let fps = match parts[2].split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().map_err(|_| invalid("frame rate"))?;
            let den: f64 = den.parse().map_err(|_| invalid("frame rate"))?;
            if den == 0.0 { 0.0 } else { num / den }
        }
        None => parts[2].parse().map_err(|_| invalid("frame rate"))?,
    };
    if width == 0 || height == 0 || !(fps.is_finite() && fps > 0.0) {
        return Err(invalid("zero dimension or frame rate"));
    }
    Ok(VideoInfo { width, height, fps })
}

/// Reads frames of a video file as [`Frame`]s.
///
/// End of stream is only reported once ffmpeg has exited successfully; a
/// decoder that dies mid-file surfaces as `Decoding`.
pub struct VideoDecoder {
    process: Child,
    stdout: BufReader<ChildStdout>,
    stderr: StderrTail,
    info: VideoInfo,
    frame_size: usize,
    frames_read: u64,
    finished: bool,
}

impl VideoDecoder {
    pub fn open(tools: &FfmpegTools, video_path: &Path) -> Result<Self> {
        let info = stream_info(tools, video_path)?;
        tracing::debug!(
            path = %video_path.display(),
            width = info.width,
            height = info.height,
            fps = info.fps,
            "opening video decoder"
        );

        let mut process = Command::new(&tools.ffmpeg)
            .args(QUIET_ARGS)
            .arg("-i")
            .arg(video_path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
            .arg(format!("{}x{}", info.width, info.height))
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| NarratorError::Decoding {
                message: format!("Failed to start ffmpeg decoder: {e}"),
            })?;

        let stdout = process.stdout.take().ok_or_else(|| NarratorError::Decoding {
            message: "Failed to capture ffmpeg stdout".to_string(),
        })?;
        let stderr = StderrTail::spawn(process.stderr.take());
        let frame_size = (info.width * info.height * 3) as usize;

        Ok(Self {
            process,
            stdout: BufReader::with_capacity(frame_size * 2, stdout),
            stderr,
            info,
            frame_size,
            frames_read: 0,
            finished: false,
        })
    }

    pub fn info(&self) -> VideoInfo {
        self.info
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Next frame, or `None` at a clean end of stream.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        let mut buffer = vec![0u8; self.frame_size];
        match self.stdout.read_exact(&mut buffer) {
            Ok(()) => {
                self.frames_read += 1;
                Frame::from_raw(self.info.width, self.info.height, buffer)
                    .map(Some)
                    .ok_or_else(|| NarratorError::Decoding {
                        message: "frame buffer size mismatch".to_string(),
                    })
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finish_stream()?;
                Ok(None)
            }
            Err(e) => Err(NarratorError::Decoding {
                message: format!("Failed to read frame: {e}"),
            }),
        }
    }

    fn finish_stream(&mut self) -> Result<()> {
        self.finished = true;
        let status = self.process.wait().map_err(|e| NarratorError::Decoding {
            message: format!("Failed to wait for ffmpeg decoder: {e}"),
        })?;
        let stderr = self.stderr.finish();
        if !status.success() {
            return Err(NarratorError::Decoding {
                message: format!(
                    "ffmpeg decoder exited with {status} after {} frame(s): {stderr}",
                    self.frames_read
                ),
            });
        }
        tracing::debug!(frames = self.frames_read, "ffmpeg decoder finished");
        Ok(())
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.process.kill();
            let _ = self.process.wait();
        }
    }
}

/// Output settings for [`VideoEncoder`].
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Audio track muxed into the output.
    pub audio: PathBuf,
    /// Optional `-vf` filtergraph (caption burn-in).
    pub video_filter: Option<String>,
    pub output: PathBuf,
    /// Working directory of the encoder; relative paths in `video_filter`
    /// resolve against it.
    pub working_dir: Option<PathBuf>,
}

impl EncodeSettings {
    /// ffmpeg arguments: raw frames on stdin, audio file as input 1,
    /// H.264 + AAC out. Audio is padded with silence and cut at the end of
    /// the video.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args: Vec<String> = QUIET_ARGS.map(String::from).to_vec();
        args.extend([
            "-y".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-s".into(),
            format!("{}x{}", self.width, self.height),
            "-r".into(),
            format!("{}", self.fps),
            "-i".into(),
            "-".into(),
            "-i".into(),
            self.audio.to_string_lossy().into_owned(),
            "-map".into(),
            "0:v".into(),
            "-map".into(),
            "1:a".into(),
        ]);
        if let Some(filter) = &self.video_filter {
            args.extend(["-vf".into(), filter.clone()]);
        }
        args.extend(
            [
                "-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac", "-b:a", "192k", "-af",
                "apad", "-shortest", "-movflags", "+faststart",
            ]
            .map(String::from),
        );
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Writes frames into an ffmpeg encoding process.
pub struct VideoEncoder {
    process: Child,
    stdin: Option<ChildStdin>,
    stderr: StderrTail,
    frame_count: u64,
}

impl VideoEncoder {
    pub fn start(tools: &FfmpegTools, settings: &EncodeSettings) -> Result<Self> {
        let args = settings.ffmpeg_args();
        tracing::debug!(?args, "starting ffmpeg encoder");

        let mut command = Command::new(&tools.ffmpeg);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if let Some(dir) = &settings.working_dir {
            command.current_dir(dir);
        }
        let mut process = command
            .spawn()
            .map_err(|e| NarratorError::Encoding {
                message: format!("Failed to start ffmpeg encoder: {e}"),
            })?;
        let stdin = process.stdin.take().ok_or_else(|| NarratorError::Encoding {
            message: "Failed to capture ffmpeg stdin".to_string(),
        })?;
        let stderr = StderrTail::spawn(process.stderr.take());

        Ok(Self {
            process,
            stdin: Some(stdin),
            stderr,
            frame_count: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| NarratorError::Encoding {
            message: "encoder already finished".to_string(),
        })?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| NarratorError::Encoding {
                message: format!("Failed to write frame: {e}"),
            })?;
        self.frame_count += 1;
        Ok(())
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Close stdin and wait for ffmpeg to finish the file.
    pub fn finish(mut self) -> Result<u64> {
        drop(self.stdin.take());
        let status = self.process.wait().map_err(|e| NarratorError::Encoding {
            message: format!("Failed to wait for ffmpeg: {e}"),
        })?;
        let stderr = self.stderr.finish();
        if !status.success() {
            return Err(NarratorError::Encoding {
                message: format!("ffmpeg exited with {status}: {stderr}"),
            });
        }
        tracing::debug!(frames = self.frame_count, "ffmpeg encoder finished");
        Ok(self.frame_count)
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.process.kill();
            let _ = self.process.wait();
        }
    }
}
