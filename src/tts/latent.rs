//! Initial noise for the latent denoiser.

use crate::tts::model_config::ModelConfig;
use crate::tts::tokenizer::length_to_mask;
use ndarray::{Array3, Axis};
use rand::Rng;
use std::f64::consts::PI;

/// Draw one standard-normal sample with the Box–Muller transform.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    // `gen` yields [0, 1); flipping to (0, 1] keeps ln() finite.
    let u1: f64 = 1.0 - rng.r#gen::<f64>();
    let u2: f64 = rng.r#gen::<f64>();
    ((-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()) as f32
}

/// Number of latent frames needed for `duration_secs` of audio.
pub fn latent_frames(duration_secs: f32, config: &ModelConfig) -> usize {
    let wav_len = (duration_secs.max(0.0) * config.sample_rate() as f32) as usize;
    wav_len.div_ceil(config.latent_chunk_size())
}

/// Noise tensor `[batch, channels, frames]` and its `[batch, 1, frames]` mask.
///
/// The time axis is sized from the longest duration; positions past each
/// item's own length are zeroed by the mask.
pub fn sample_noisy_latent<R: Rng + ?Sized>(
    durations: &[f32],
    config: &ModelConfig,
    rng: &mut R,
) -> (Array3<f32>, Array3<f32>) {
    let lengths: Vec<usize> = durations
        .iter()
        .map(|&d| latent_frames(d, config))
        .collect();
    let max_frames = lengths.iter().copied().max().unwrap_or(0).max(1);
    let channels = config.latent_channels();

    let mut latent =
        Array3::<f32>::from_shape_simple_fn((durations.len(), channels, max_frames), || {
            standard_normal(&mut *rng)
        });
    let mask = length_to_mask(&lengths, Some(max_frames));

    for (b, mut item) in latent.axis_iter_mut(Axis(0)).enumerate() {
        for mut channel in item.axis_iter_mut(Axis(0)) {
            for (t, value) in channel.iter_mut().enumerate() {
                *value *= mask[[b, 0, t]];
            }
        }
    }

    (latent, mask)
}

/// Count NaN and infinite entries.
pub fn count_non_finite(values: &Array3<f32>) -> usize {
    values.iter().filter(|v| !v.is_finite()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::model_config::{AeConfig, TtlConfig};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn config() -> ModelConfig {
        ModelConfig {
            ae: AeConfig {
                sample_rate: 16000,
                base_chunk_size: 160,
            },
            ttl: TtlConfig {
                chunk_compress_factor: 2,
                latent_dim: 4,
            },
        }
    }

    #[test]
    fn normal_samples_have_unit_moments() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let samples: Vec<f32> = (0..n).map(|_| standard_normal(&mut rng)).collect();
        let mean = samples.iter().sum::<f32>() / n as f32;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
        assert!(samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn frames_round_up() {
        // 0.5s at 16kHz = 8000 samples, 320 per frame -> 25 frames.
        assert_eq!(latent_frames(0.5, &config()), 25);
        // 8001 samples needs one more frame.
        assert_eq!(latent_frames(8001.0 / 16000.0, &config()), 26);
        assert_eq!(latent_frames(0.0, &config()), 0);
    }

    #[test]
    fn latent_shape_follows_longest_duration() {
        let mut rng = StdRng::seed_from_u64(1);
        let (latent, mask) = sample_noisy_latent(&[0.5, 0.2], &config(), &mut rng);
        assert_eq!(latent.shape(), &[2, 8, 25]);
        assert_eq!(mask.shape(), &[2, 1, 25]);
    }

    #[test]
    fn padding_is_masked_to_zero() {
        let mut rng = StdRng::seed_from_u64(3);
        let (latent, mask) = sample_noisy_latent(&[0.5, 0.2], &config(), &mut rng);
        // Second item: 3200 samples -> 10 frames.
        assert_eq!(mask[[1, 0, 9]], 1.0);
        assert_eq!(mask[[1, 0, 10]], 0.0);
        for c in 0..8 {
            for t in 10..25 {
                assert_eq!(latent[[1, c, t]], 0.0);
            }
        }
    }

    #[test]
    fn same_seed_same_noise() {
        let a = sample_noisy_latent(&[0.3], &config(), &mut StdRng::seed_from_u64(9)).0;
        let b = sample_noisy_latent(&[0.3], &config(), &mut StdRng::seed_from_u64(9)).0;
        assert_eq!(a, b);
    }

    #[test]
    fn counts_non_finite_values() {
        let mut values = Array3::<f32>::zeros((1, 2, 2));
        values[[0, 0, 0]] = f32::NAN;
        values[[0, 1, 1]] = f32::INFINITY;
        assert_eq!(count_non_finite(&values), 2);
    }
}
