//! WAV export and sample-format helpers.

use crate::error::{Result, RiddiError};
use std::io::Cursor;
use std::path::Path;

/// Length of the canonical RIFF/WAVE header for 16-bit PCM.
pub const WAV_HEADER_LEN: usize = 44;

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn encode_error(err: hound::Error) -> RiddiError {
    RiddiError::WavEncode {
        message: err.to_string(),
    }
}

/// Encode mono float samples as a 16-bit PCM WAV file in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, wav_spec(sample_rate)).map_err(encode_error)?;
        for &sample in samples {
            writer.write_sample(to_i16(sample)).map_err(encode_error)?;
        }
        writer.finalize().map_err(encode_error)?;
    }
    Ok(cursor.into_inner())
}

/// Write mono float samples to `path` as 16-bit PCM WAV.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let mut writer = hound::WavWriter::create(path, wav_spec(sample_rate)).map_err(encode_error)?;
    for &sample in samples {
        writer.write_sample(to_i16(sample)).map_err(encode_error)?;
    }
    writer.finalize().map_err(encode_error)
}

/// Fields of a canonical 44-byte WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub audio_format: u16,
    pub num_channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Decode the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let invalid = |message: &str| RiddiError::WavEncode {
            message: message.to_string(),
        };
        if bytes.len() < WAV_HEADER_LEN {
            return Err(invalid("header shorter than 44 bytes"));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(invalid("missing RIFF/WAVE signature"));
        }
        if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
            return Err(invalid("not a canonical PCM header"));
        }
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u32_at =
            |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

        Ok(Self {
            audio_format: u16_at(20),
            num_channels: u16_at(22),
            sample_rate: u32_at(24),
            byte_rate: u32_at(28),
            block_align: u16_at(32),
            bits_per_sample: u16_at(34),
            data_size: u32_at(40),
        })
    }

    pub fn duration_secs(&self) -> f32 {
        if self.byte_rate == 0 {
            return 0.0;
        }
        self.data_size as f32 / self.byte_rate as f32
    }
}

/// Join chunk waveforms with `silence_secs` of silence between them.
pub fn concat_with_silence(chunks: &[Vec<f32>], sample_rate: u32, silence_secs: f32) -> Vec<f32> {
    let gap = (silence_secs.max(0.0) * sample_rate as f32) as usize;
    let total: usize = chunks.iter().map(Vec::len).sum::<usize>()
        + gap * chunks.len().saturating_sub(1);
    let mut out = Vec::with_capacity(total);
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            out.resize(out.len() + gap, 0.0);
        }
        out.extend_from_slice(chunk);
    }
    out
}

/// Linear interpolation resampling.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
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
                (left + (right - left) * fraction) as f32
            }
        })
        .collect()
}

/// Repeat each mono sample across `channels` interleaved channels.
pub fn interleave_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .iter()
        .flat_map(|&s| std::iter::repeat_n(s, channels))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_of_one_second_of_silence() {
        let bytes = encode_wav(&vec![0.0; 16000], 16000).unwrap();
        let header = WavHeader::parse(&bytes).unwrap();

        assert_eq!(header.data_size, 32000);
        assert_eq!(header.byte_rate, 32000);
        assert_eq!(header.num_channels, 1);
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(header.sample_rate, 16000);
        assert_eq!(header.block_align, 2);
        assert_eq!(header.audio_format, 1);
        assert_eq!(bytes.len(), WAV_HEADER_LEN + 32000);
        assert!((header.duration_secs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn samples_are_clamped_to_i16() {
        let bytes = encode_wav(&[2.0, -2.0, 0.5], 8000).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![i16::MAX, -i16::MAX, 16383]);
    }

    #[test]
    fn write_wav_creates_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        write_wav(&path, &[0.1; 441], 44100).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 44100);
        assert_eq!(reader.len(), 441);
    }

    #[test]
    fn parse_rejects_non_wav_bytes() {
        assert!(WavHeader::parse(b"short").is_err());
        let mut bytes = encode_wav(&[0.0; 4], 16000).unwrap();
        bytes[0] = b'X';
        assert!(WavHeader::parse(&bytes).is_err());
    }

    #[test]
    fn concat_inserts_silence_between_chunks_only() {
        let chunks = vec![vec![1.0; 3], vec![2.0; 2]];
        let joined = concat_with_silence(&chunks, 10, 0.2);
        assert_eq!(joined, vec![1.0, 1.0, 1.0, 0.0, 0.0, 2.0, 2.0]);
        assert!(concat_with_silence(&[], 10, 0.2).is_empty());
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn resample_upsamples_by_ratio() {
        let samples = vec![0.5; 16000];
        let out = resample(&samples, 16000, 48000);
        assert_eq!(out.len(), 48000);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn resample_interpolates_between_samples() {
        let out = resample(&[0.0, 1.0], 1, 2);
        assert_eq!(out.len(), 4);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn interleave_duplicates_channels() {
        assert_eq!(interleave_mono(&[0.1, 0.2], 2), vec![0.1, 0.1, 0.2, 0.2]);
        assert_eq!(interleave_mono(&[0.1], 1), vec![0.1]);
    }
}
