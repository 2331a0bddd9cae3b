//! Triangular mel filter bank over a one-sided FFT spectrum.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

const SLANEY_F_SP: f32 = 200.0 / 3.0;
const SLANEY_MIN_LOG_HZ: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MelScale {
    /// Linear below 1 kHz, logarithmic above (Auditory Toolbox).
    Slaney,
    Htk,
}

impl MelScale {
    pub fn hz_to_mel(self, hz: f32) -> f32 {
        match self {
            MelScale::Htk => 2595.0 * (1.0 + hz / 700.0).log10(),
            MelScale::Slaney => {
                if hz >= SLANEY_MIN_LOG_HZ {
                    SLANEY_MIN_LOG_HZ / SLANEY_F_SP + (hz / SLANEY_MIN_LOG_HZ).ln() / logstep()
                } else {
                    hz / SLANEY_F_SP
                }
            }
        }
    }

    pub fn mel_to_hz(self, mel: f32) -> f32 {
        match self {
            MelScale::Htk => 700.0 * (10f32.powf(mel / 2595.0) - 1.0),
            MelScale::Slaney => {
                let min_log_mel = SLANEY_MIN_LOG_HZ / SLANEY_F_SP;
                if mel >= min_log_mel {
                    SLANEY_MIN_LOG_HZ * (logstep() * (mel - min_log_mel)).exp()
                } else {
                    mel * SLANEY_F_SP
                }
            }
        }
    }
}

fn logstep() -> f32 {
    6.4f32.ln() / 27.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelConfig {
    pub n_mels: usize,
    pub f_min: f32,
    /// Upper edge in Hz; `None` means Nyquist.
    pub f_max: Option<f32>,
    pub scale: MelScale,
    /// Scale each filter to unit area (`2 / bandwidth`).
    pub slaney_norm: bool,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            n_mels: 128,
            f_min: 0.0,
            f_max: None,
            scale: MelScale::Slaney,
            slaney_norm: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MelFilterBank {
    /// `n_mels` rows of `fft_len / 2 + 1` weights.
    weights: Vec<Vec<f32>>,
    /// Hz edges, `n_mels + 2` of them.
    edges: Vec<f32>,
}

impl MelFilterBank {
    pub fn new(sample_rate: u32, fft_len: usize, config: &MelConfig) -> Result<Self> {
        if fft_len == 0 {
            return Err(Error::ZeroFftLen);
        }
        if config.n_mels == 0 {
            return Err(Error::ZeroMels);
        }
        let nyquist = sample_rate as f32 / 2.0;
        let f_max = config.f_max.unwrap_or(nyquist);
        if config.f_min < 0.0 || f_max <= config.f_min || f_max > nyquist {
            return Err(Error::InvalidFrequencyRange {
                f_min: config.f_min,
                f_max,
                sample_rate,
            });
        }

        let mel_min = config.scale.hz_to_mel(config.f_min);
        let mel_max = config.scale.hz_to_mel(f_max);
        let n_points = config.n_mels + 2;
        let edges: Vec<f32> = (0..n_points)
            .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (n_points - 1) as f32)
            .map(|mel| config.scale.mel_to_hz(mel))
            .collect();

        let n_bins = fft_len / 2 + 1;
        let bin_hz = sample_rate as f32 / fft_len as f32;

        let weights = edges
            .windows(3)
            .map(|edge| {
                let (left, center, right) = (edge[0], edge[1], edge[2]);
                let norm = if config.slaney_norm {
                    2.0 / (right - left)
                } else {
                    1.0
                };
                (0..n_bins)
                    .map(|bin| {
                        let freq = bin as f32 * bin_hz;
                        let lower = (freq - left) / (center - left);
                        let upper = (right - freq) / (right - center);
                        lower.min(upper).max(0.0) * norm
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let empty = weights
            .iter()
            .filter(|row| row.iter().all(|&w| w == 0.0))
            .count();
        if empty > 0 {
            debug!(empty, n_mels = config.n_mels, fft_len, "mel bands with no fft bins");
        }

        Ok(Self { weights, edges })
    }

    pub fn n_mels(&self) -> usize {
        self.weights.len()
    }

    pub fn n_bins(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    pub fn weights(&self) -> &[Vec<f32>] {
        &self.weights
    }

    /// Centre frequency of each band in Hz.
    pub fn center_frequencies(&self) -> Vec<f32> {
        self.edges.windows(3).map(|edge| edge[1]).collect()
    }

    /// Projects every power frame onto the bank; output is frames x `n_mels`.
    pub fn apply(&self, spectrogram: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        let n_bins = self.n_bins();
        spectrogram
            .iter()
            .map(|frame| {
                if frame.len() != n_bins {
                    return Err(Error::BinMismatch {
                        expected: n_bins,
                        got: frame.len(),
                    });
                }
                Ok(self
                    .weights
                    .iter()
                    .map(|row| row.iter().zip(frame).map(|(w, p)| w * p).sum())
                    .collect())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_round_trip_known_points() {
        assert!((MelScale::Slaney.hz_to_mel(1000.0) - 15.0).abs() < 1e-4);
        assert!((MelScale::Slaney.hz_to_mel(500.0) - 7.5).abs() < 1e-4);
        assert!((MelScale::Htk.hz_to_mel(700.0) - 2595.0 * 2f32.log10()).abs() < 1e-2);
        for scale in [MelScale::Slaney, MelScale::Htk] {
            for hz in [0.0, 250.0, 1000.0, 4000.0, 8000.0] {
                let back = scale.mel_to_hz(scale.hz_to_mel(hz));
                assert!((back - hz).abs() < 0.05, "{scale:?} {hz} -> {back}");
            }
        }
    }

    #[test]
    fn bank_shape_and_non_negative_weights() {
        let bank = MelFilterBank::new(16_000, 512, &MelConfig {
            n_mels: 40,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(bank.n_mels(), 40);
        assert_eq!(bank.n_bins(), 257);
        assert!(bank.weights().iter().flatten().all(|&w| w >= 0.0));
    }

    #[test]
    fn each_band_covers_a_contiguous_range() {
        let bank = MelFilterBank::new(16_000, 2048, &MelConfig::default()).unwrap();
        for row in bank.weights() {
            let nonzero: Vec<usize> = row
                .iter()
                .enumerate()
                .filter(|(_, &w)| w > 0.0)
                .map(|(i, _)| i)
                .collect();
            if let (Some(first), Some(last)) = (nonzero.first(), nonzero.last()) {
                assert_eq!(last - first + 1, nonzero.len());
            }
        }
    }

    #[test]
    fn centers_increase() {
        let bank = MelFilterBank::new(22_050, 1024, &MelConfig {
            n_mels: 64,
            scale: MelScale::Htk,
            ..Default::default()
        })
        .unwrap();
        let centers = bank.center_frequencies();
        assert_eq!(centers.len(), 64);
        assert!(centers.windows(2).all(|w| w[0] < w[1]));
        assert!(*centers.last().unwrap() < 11_025.0);
    }

    #[test]
    fn single_bin_lands_in_matching_band() {
        let fft_len = 1024;
        let bank = MelFilterBank::new(16_000, fft_len, &MelConfig {
            n_mels: 32,
            slaney_norm: false,
            ..Default::default()
        })
        .unwrap();
        let mut frame = vec![0.0; bank.n_bins()];
        // 2000 Hz
        frame[128] = 1.0;
        let mel = bank.apply(&[frame]).unwrap();
        let peak = mel[0]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();

        let edges = &bank.edges;
        assert!(edges[peak] <= 2000.0 && 2000.0 <= edges[peak + 2]);
    }

    #[test]
    fn slaney_norm_gives_unit_area_in_hz() {
        let fft_len = 4096;
        let sample_rate = 16_000;
        let bank = MelFilterBank::new(sample_rate, fft_len, &MelConfig {
            n_mels: 20,
            ..Default::default()
        })
        .unwrap();
        let bin_hz = sample_rate as f32 / fft_len as f32;
        // triangles with unit peak have area bandwidth / 2
        for row in &bank.weights()[5..] {
            let area: f32 = row.iter().sum::<f32>() * bin_hz;
            assert!((area - 1.0).abs() < 0.05, "area {area}");
        }
    }

    #[test]
    fn rejects_bad_ranges() {
        let too_high = MelConfig {
            f_max: Some(9000.0),
            ..Default::default()
        };
        assert!(matches!(
            MelFilterBank::new(16_000, 512, &too_high),
            Err(Error::InvalidFrequencyRange { .. })
        ));
        let no_bands = MelConfig {
            n_mels: 0,
            ..Default::default()
        };
        assert!(matches!(
            MelFilterBank::new(16_000, 512, &no_bands),
            Err(Error::ZeroMels)
        ));
    }

    #[test]
    fn apply_checks_bin_count() {
        let bank = MelFilterBank::new(16_000, 512, &MelConfig::default()).unwrap();
        let result = bank.apply(&[vec![0.0; 100]]);
        assert!(matches!(
            result,
            Err(Error::BinMismatch {
                expected: 257,
                got: 100
            })
        ));
    }
}
