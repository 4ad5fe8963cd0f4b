//! WAV reading and writing.
//!
//! Synthesized speech arrives as raw little-endian 16-bit PCM and is stored
//! as a mono WAV. The transcriber wants 16 kHz mono, so reading downmixes and
//! resamples whatever the file holds.

use crate::defaults::TRANSCRIBE_SAMPLE_RATE;
use crate::error::{NarratorError, Result};
use std::io::Read;
use std::path::Path;

/// Decoded audio at the transcription sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct WavClip {
    samples: Vec<i16>,
    source_rate: u32,
}

impl WavClip {
    /// Decode WAV data from any reader.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let wav_reader = hound::WavReader::new(reader).map_err(|e| NarratorError::Audio {
            message: format!("Failed to parse WAV file: {e}"),
        })?;

        let spec = wav_reader.spec();
        if spec.channels == 0 {
            return Err(NarratorError::Audio {
                message: "WAV file declares zero channels".to_string(),
            });
        }
        let raw_samples = read_as_i16(wav_reader)?;
        let mono_samples = downmix(&raw_samples, spec.channels);
        let samples = resample(&mono_samples, spec.sample_rate, TRANSCRIBE_SAMPLE_RATE);

        Ok(Self {
            samples,
            source_rate: spec.sample_rate,
        })
    }

    /// Decode a WAV file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| NarratorError::Audio {
            message: format!("Failed to open {}: {e}", path.display()),
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    /// Sample rate of the file before resampling.
    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    /// Clip length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / TRANSCRIBE_SAMPLE_RATE as f64
    }
}

fn read_as_i16<R: Read>(mut reader: hound::WavReader<R>) -> Result<Vec<i16>> {
    let spec = reader.spec();
    let to_err = |e: hound::Error| NarratorError::Audio {
        message: format!("Failed to read WAV samples: {e}"),
    };
    match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(to_err),
        hound::SampleFormat::Int if spec.bits_per_sample <= 16 => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v << (16 - spec.bits_per_sample)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(to_err),
        hound::SampleFormat::Int => {
            let shift = spec.bits_per_sample - 16;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(to_err)
        }
    }
}

/// Average interleaved channels into one.
fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

/// Interpret raw little-endian 16-bit PCM bytes; a trailing odd byte is dropped.
pub fn pcm_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Write raw 16-bit mono PCM to `path` as a WAV file.
pub fn write_pcm_wav(path: &Path, pcm: &[u8], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let to_err = |e: hound::Error| NarratorError::Audio {
        message: format!("Failed to write {}: {e}", path.display()),
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(to_err)?;
    for sample in pcm_to_samples(pcm) {
        writer.write_sample(sample).map_err(to_err)?;
    }
    writer.finalize().map_err(to_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn from_reader_16khz_mono_matches_exactly() {
        let input_samples = vec![100i16, 200, 300, 400, 500];
        let wav_data = make_wav_data(16000, 1, &input_samples);

        let clip = WavClip::from_reader(Cursor::new(wav_data)).unwrap();

        assert_eq!(clip.samples(), input_samples.as_slice());
        assert_eq!(clip.source_rate(), 16000);
    }

    #[test]
    fn from_reader_stereo_downmixes_to_mono() {
        // Stereo pairs: (100, 200), (300, 400), (-500, 500)
        let stereo_samples = vec![100i16, 200, 300, 400, -500, 500];
        let wav_data = make_wav_data(16000, 2, &stereo_samples);

        let clip = WavClip::from_reader(Cursor::new(wav_data)).unwrap();

        assert_eq!(clip.into_samples(), vec![150i16, 350, 0]);
    }

    #[test]
    fn from_reader_speech_rate_resamples_to_16khz() {
        // One second of synthesized speech at 22.05 kHz
        let input_samples = vec![1000i16; 22050];
        let wav_data = make_wav_data(22050, 1, &input_samples);

        let clip = WavClip::from_reader(Cursor::new(wav_data)).unwrap();

        assert!((15900..=16100).contains(&clip.samples().len()));
        assert!(clip.samples().iter().all(|&s| (900..=1100).contains(&s)));
        assert!((clip.duration_secs() - 1.0).abs() < 0.01);
    }

    #[test]
    fn from_reader_float_samples_are_scaled() {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for s in [0.0f32, 0.5, -1.0] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let clip = WavClip::from_reader(Cursor::new(cursor.into_inner())).unwrap();

        assert_eq!(clip.samples()[0], 0);
        assert_eq!(clip.samples()[1], i16::MAX / 2);
        assert_eq!(clip.samples()[2], -i16::MAX);
    }

    #[test]
    fn invalid_wav_data_returns_error() {
        let result = WavClip::from_reader(Cursor::new(vec![0u8, 1, 2, 3, 4, 5]));

        match result {
            Err(NarratorError::Audio { message }) => {
                assert!(message.contains("Failed to parse WAV file"));
            }
            other => panic!("Expected Audio error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_wav_missing_riff_header() {
        let bad_data = b"XXXX\x00\x00\x00\x00WAVEfmt ";
        assert!(WavClip::from_reader(Cursor::new(bad_data.to_vec())).is_err());
    }

    #[test]
    fn test_malformed_wav_all_zeros() {
        assert!(WavClip::from_reader(Cursor::new(vec![0u8; 1000])).is_err());
    }

    #[test]
    fn open_missing_file_is_audio_error() {
        let result = WavClip::open(Path::new("/nonexistent/narrator/speech.wav"));
        assert!(matches!(result, Err(NarratorError::Audio { .. })));
    }

    #[test]
    fn resample_identity_same_rate() {
        let samples = vec![100i16, 200, 300, 400, 500];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn resample_upsample_verification() {
        let samples = vec![0i16, 1000, 2000];
        let resampled = resample(&samples, 8000, 16000);

        assert_eq!(resampled.len(), 6);
        assert_eq!(resampled[0], 0);
        assert!(resampled[1] > 0 && resampled[1] < 1000);
        assert_eq!(resampled[2], 1000);
    }

    #[test]
    fn resample_handles_edge_cases() {
        assert!(resample(&[], 16000, 8000).is_empty());

        let single = resample(&[100i16], 16000, 8000);
        assert_eq!(single, vec![100]);
    }

    #[test]
    fn pcm_to_samples_is_little_endian() {
        let pcm = [0x01, 0x00, 0xFF, 0xFF, 0x00, 0x80, 0x7F];
        assert_eq!(pcm_to_samples(&pcm), vec![1, -1, i16::MIN]);
    }

    #[test]
    fn write_pcm_wav_produces_mono_16bit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Widget.wav");
        let samples = [0i16, 1200, -1200, 32000];
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        write_pcm_wav(&path, &pcm, 22050).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 16);
        let written: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(written, samples);
    }
}
