//! Caption timing and burn-in styling.
//!
//! Captions render one at a time at the bottom-centre anchor. When two
//! segments overlap the later one wins: the earlier caption is cut at the
//! later caption's start time.

use crate::defaults;
use crate::error::Result;
use crate::stt::transcriber::TranscriptSegment;
use std::path::Path;

/// One caption shown over `[start, end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Non-overlapping, time-ordered captions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptionTrack {
    cues: Vec<Cue>,
}

impl CaptionTrack {
    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    /// Caption visible at time `t` (seconds).
    pub fn caption_at(&self, t: f64) -> Option<&Cue> {
        self.cues.iter().find(|cue| cue.start <= t && t < cue.end)
    }

    /// Render as SubRip text.
    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for (index, cue) in self.cues.iter().enumerate() {
            out.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                index + 1,
                srt_timestamp(cue.start),
                srt_timestamp(cue.end),
                cue.text
            ));
        }
        out
    }

    pub fn write_srt(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_srt())?;
        Ok(())
    }
}

/// `HH:MM:SS,mmm`
fn srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        ms
    )
}

/// Caption appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    pub font: String,
    pub font_size: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font: defaults::SUBTITLE_FONT.to_string(),
            font_size: defaults::SUBTITLE_FONT_SIZE,
        }
    }
}

/// Turns transcript segments into a caption track and its burn-in filter.
#[derive(Debug, Clone, Default)]
pub struct SubtitleCompositor {
    style: CaptionStyle,
}

impl SubtitleCompositor {
    pub fn new(style: CaptionStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &CaptionStyle {
        &self.style
    }

    /// Lay out segments as captions, later segments replacing earlier ones.
    pub fn compose(&self, segments: &[TranscriptSegment]) -> CaptionTrack {
        let mut ordered: Vec<&TranscriptSegment> = segments
            .iter()
            .filter(|s| !s.text.trim().is_empty() && s.end > s.start)
            .collect();
        ordered.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut cues: Vec<Cue> = Vec::with_capacity(ordered.len());
        for segment in ordered {
            if let Some(previous) = cues.last_mut()
                && previous.end > segment.start
            {
                previous.end = segment.start;
            }
            cues.push(Cue {
                start: segment.start,
                end: segment.end,
                text: segment.text.trim().to_string(),
            });
        }
        cues.retain(|cue| cue.end > cue.start);
        CaptionTrack { cues }
    }

    /// ffmpeg `subtitles` filter burning `srt_path` in: white text on an
    /// opaque black box, anchored bottom-centre.
    pub fn burn_in_filter(&self, srt_path: &Path) -> String {
        format!(
            "subtitles='{}':force_style='FontName={},FontSize={},PrimaryColour=&H00FFFFFF,BackColour=&H00000000,OutlineColour=&H00000000,BorderStyle=3,Outline=1,Shadow=0,Alignment=2'",
            escape_filter_path(srt_path),
            self.style.font,
            self.style.font_size
        )
    }
}

/// Escape a path for use inside a single-quoted filtergraph argument.
///
/// Two levels: the filter option parser sees `\:` and `\'`; the graph
/// parser cannot quote `'`, so each one closes the quote, escapes it and
/// reopens.
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
        .replace('\'', "'\\''")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(start, end, text, Some(0.9))
    }

    #[test]
    fn test_compose_keeps_disjoint_segments() {
        let track = SubtitleCompositor::default().compose(&[
            seg(0.0, 1.5, "Hello"),
            seg(2.0, 3.0, "world"),
        ]);

        assert_eq!(track.len(), 2);
        assert_eq!(track.caption_at(1.0).map(|c| c.text.as_str()), Some("Hello"));
        assert_eq!(track.caption_at(1.7), None);
        assert_eq!(track.caption_at(2.5).map(|c| c.text.as_str()), Some("world"));
    }

    #[test]
    fn test_overlap_later_segment_wins() {
        let track = SubtitleCompositor::default().compose(&[
            seg(0.0, 3.0, "first"),
            seg(2.0, 4.0, "second"),
        ]);

        assert_eq!(track.cues()[0].end, 2.0);
        assert_eq!(track.caption_at(2.5).map(|c| c.text.as_str()), Some("second"));
        assert_eq!(track.caption_at(1.9).map(|c| c.text.as_str()), Some("first"));
    }

    #[test]
    fn test_same_start_replaces_earlier_caption() {
        let track = SubtitleCompositor::default().compose(&[
            seg(1.0, 2.0, "dropped"),
            seg(1.0, 2.5, "shown"),
        ]);

        assert_eq!(track.len(), 1);
        assert_eq!(track.cues()[0].text, "shown");
    }

    #[test]
    fn test_unordered_input_is_sorted() {
        let track = SubtitleCompositor::default().compose(&[
            seg(5.0, 6.0, "late"),
            seg(0.0, 1.0, "early"),
        ]);
        assert_eq!(track.cues()[0].text, "early");
    }

    #[test]
    fn test_blank_and_empty_interval_segments_are_skipped() {
        let track = SubtitleCompositor::default().compose(&[
            seg(0.0, 1.0, "   "),
            seg(2.0, 2.0, "instant"),
        ]);
        assert!(track.is_empty());
    }

    #[test]
    fn test_srt_rendering() {
        let track = SubtitleCompositor::default().compose(&[
            seg(0.0, 1.25, "Hello"),
            seg(3661.5, 3662.0, "later"),
        ]);

        assert_eq!(
            track.to_srt(),
            "1\n00:00:00,000 --> 00:00:01,250\nHello\n\n2\n01:01:01,500 --> 01:01:02,000\nlater\n\n"
        );
    }

    #[test]
    fn test_burn_in_filter_style() {
        let compositor = SubtitleCompositor::default();
        let filter = compositor.burn_in_filter(Path::new("/tmp/run:1/Widget.srt"));

        assert!(filter.starts_with("subtitles='/tmp/run\\:1/Widget.srt'"));
        assert!(filter.contains("FontName=Arial"));
        assert!(filter.contains("FontSize=24"));
        assert!(filter.contains("PrimaryColour=&H00FFFFFF"));
        assert!(filter.contains("BorderStyle=3"));
        assert!(filter.contains("Alignment=2"));
    }

    #[test]
    fn test_burn_in_filter_escapes_apostrophe_outside_quotes() {
        let compositor = SubtitleCompositor::default();
        let filter = compositor.burn_in_filter(Path::new("/tmp/rec1-x/Men's Shoes_final.srt"));

        assert!(
            filter.starts_with(r"subtitles='/tmp/rec1-x/Men\'\''s Shoes_final.srt':force_style="),
            "{filter}"
        );
    }

    #[test]
    fn test_write_srt() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("captions.srt");
        let track = SubtitleCompositor::default().compose(&[seg(0.0, 1.0, "Hi")]);

        track.write_srt(&path).unwrap();

        assert!(std::fs::read_to_string(&path).unwrap().contains("Hi"));
    }
}
