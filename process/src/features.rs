//! Fixed-length note feature vectors: metadata slots followed by a
//! time-reduced dB mel spectrogram.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    db::{power_to_db, DbConfig},
    mel::{MelConfig, MelFilterBank},
    spectrogram::{SpectrogramConfig, SpectrogramGenerator},
    Result,
};

pub const QUALITY_COUNT: usize = 10;

/// source, pitch, velocity and the quality flags.
pub const METADATA_LEN: usize = 3 + QUALITY_COUNT;

pub const QUALITY_NAMES: [&str; QUALITY_COUNT] = [
    "bright",
    "dark",
    "distortion",
    "fast_decay",
    "long_release",
    "multiphonic",
    "nonlinear_env",
    "percussive",
    "reverb",
    "tempo-synced",
];

/// The numeric metadata that goes into a feature vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteMetadata {
    pub instrument_source: u8,
    pub pitch: u8,
    pub velocity: u8,
    pub qualities: [u8; QUALITY_COUNT],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeReduction {
    #[default]
    Mean,
    /// Means followed by population standard deviations.
    MeanStd,
}

impl TimeReduction {
    pub fn width(self) -> usize {
        match self {
            TimeReduction::Mean => 1,
            TimeReduction::MeanStd => 2,
        }
    }

    /// Reduces frames x bands to one summary row.
    pub fn reduce(self, frames: &[Vec<f32>], n_bands: usize) -> Vec<f32> {
        let n = frames.len().max(1) as f32;
        let mut mean = vec![0.0f32; n_bands];
        for frame in frames {
            for (acc, value) in mean.iter_mut().zip(frame) {
                *acc += value;
            }
        }
        mean.iter_mut().for_each(|acc| *acc /= n);

        match self {
            TimeReduction::Mean => mean,
            TimeReduction::MeanStd => {
                let mut var = vec![0.0f32; n_bands];
                for frame in frames {
                    for ((acc, value), m) in var.iter_mut().zip(frame).zip(&mean) {
                        *acc += (value - m).powi(2);
                    }
                }
                mean.extend(var.into_iter().map(|v| (v / n).sqrt()));
                mean
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub reduction: TimeReduction,
    pub spectrogram: SpectrogramConfig,
    pub mel: MelConfig,
    pub db: DbConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureLayout {
    pub n_mels: usize,
    pub reduction: TimeReduction,
}

impl FeatureLayout {
    pub fn len(&self) -> usize {
        METADATA_LEN + self.n_mels * self.reduction.width()
    }

    /// Always false: the metadata slots are present even without mel bands.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = vec![
            "instrument_source".to_string(),
            "pitch".to_string(),
            "velocity".to_string(),
        ];
        names.extend(QUALITY_NAMES.iter().map(|q| format!("quality_{q}")));
        names.extend((0..self.n_mels).map(|i| format!("mel_mean_{i:03}")));
        if self.reduction == TimeReduction::MeanStd {
            names.extend((0..self.n_mels).map(|i| format!("mel_std_{i:03}")));
        }
        names
    }
}

pub type FeatureVector = Vec<f32>;

/// Shared across tasks; clones reuse the FFT planner and filter bank.
#[derive(Clone)]
pub struct FeatureExtractor {
    sample_rate: u32,
    config: FeatureConfig,
    bank: std::sync::Arc<MelFilterBank>,
    spect_gen: SpectrogramGenerator<f32>,
}

impl FeatureExtractor {
    pub fn new(sample_rate: u32, config: FeatureConfig) -> Result<Self> {
        config.spectrogram.validate()?;
        config.db.validate()?;
        let bank = MelFilterBank::new(sample_rate, config.spectrogram.fft_len, &config.mel)?;

        Ok(Self {
            sample_rate,
            config,
            bank: std::sync::Arc::new(bank),
            spect_gen: SpectrogramGenerator::default(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn layout(&self) -> FeatureLayout {
        FeatureLayout {
            n_mels: self.bank.n_mels(),
            reduction: self.config.reduction,
        }
    }

    /// dB mel spectrogram, frames x `n_mels`.
    #[instrument(skip(self, samples), fields(n_samples = samples.len()), level = "trace")]
    pub fn mel_spectrogram(&self, samples: &[f32]) -> Result<Vec<Vec<f32>>> {
        let power = self.spect_gen.power(samples, &self.config.spectrogram)?;
        let mut mel = self.bank.apply(&power)?;
        power_to_db(&mut mel, &self.config.db)?;
        Ok(mel)
    }

    pub fn summarize(&self, samples: &[f32]) -> Result<Vec<f32>> {
        let mel = self.mel_spectrogram(samples)?;
        Ok(self.config.reduction.reduce(&mel, self.bank.n_mels()))
    }

    pub fn extract(&self, metadata: &NoteMetadata, samples: &[f32]) -> Result<FeatureVector> {
        let layout = self.layout();
        let mut vector = Vec::with_capacity(layout.len());
        vector.push(metadata.instrument_source as f32);
        vector.push(metadata.pitch as f32);
        vector.push(metadata.velocity as f32);
        vector.extend(metadata.qualities.iter().map(|&q| q as f32));
        vector.extend(self.summarize(samples)?);
        debug_assert_eq!(vector.len(), layout.len());
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (std::f32::consts::TAU * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn metadata() -> NoteMetadata {
        NoteMetadata {
            instrument_source: 2,
            pitch: 64,
            velocity: 127,
            qualities: [0, 1, 0, 0, 1, 0, 0, 0, 0, 1],
        }
    }

    fn small_config() -> FeatureConfig {
        FeatureConfig {
            spectrogram: SpectrogramConfig {
                fft_len: 512,
                hop_len: 256,
                center: true,
            },
            mel: MelConfig {
                n_mels: 32,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn vector_length_and_metadata_slots() {
        let extractor = FeatureExtractor::new(16_000, small_config()).unwrap();
        let samples = sine(440.0, 16_000, 16_000);
        let vector = extractor.extract(&metadata(), &samples).unwrap();

        assert_eq!(vector.len(), METADATA_LEN + 32);
        assert_eq!(vector.len(), extractor.layout().len());
        assert_eq!(&vector[..3], &[2.0, 64.0, 127.0]);
        assert_eq!(
            &vector[3..METADATA_LEN],
            &[0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn length_is_fixed_across_inputs() {
        let extractor = FeatureExtractor::new(16_000, small_config()).unwrap();
        let quiet = vec![0.0; 8000];
        let loud = sine(3000.0, 16_000, 8000);
        let a = extractor.extract(&metadata(), &quiet).unwrap();
        let b = extractor.extract(&metadata(), &loud).unwrap();
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn mean_std_doubles_summary() {
        let config = FeatureConfig {
            reduction: TimeReduction::MeanStd,
            ..small_config()
        };
        let extractor = FeatureExtractor::new(16_000, config).unwrap();
        let vector = extractor
            .extract(&metadata(), &sine(440.0, 16_000, 8000))
            .unwrap();
        assert_eq!(vector.len(), METADATA_LEN + 64);
        assert_eq!(extractor.layout().names().len(), vector.len());
        assert_eq!(extractor.layout().names()[METADATA_LEN + 32], "mel_std_000");
    }

    #[test]
    fn tone_energy_lands_near_its_band() {
        let extractor = FeatureExtractor::new(16_000, small_config()).unwrap();
        let summary = extractor.summarize(&sine(2000.0, 16_000, 16_000)).unwrap();
        let peak = summary
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let center = MelFilterBank::new(16_000, 512, &small_config().mel)
            .unwrap()
            .center_frequencies()[peak];
        assert!((center - 2000.0).abs() < 400.0, "peak band centre {center}");
    }

    #[test]
    fn reduce_mean_and_std() {
        let frames = vec![vec![1.0, 2.0], vec![3.0, 2.0]];
        assert_eq!(TimeReduction::Mean.reduce(&frames, 2), vec![2.0, 2.0]);
        assert_eq!(
            TimeReduction::MeanStd.reduce(&frames, 2),
            vec![2.0, 2.0, 1.0, 0.0]
        );
    }

    #[test]
    fn names_start_with_metadata() {
        let layout = FeatureLayout {
            n_mels: 4,
            reduction: TimeReduction::Mean,
        };
        let names = layout.names();
        assert_eq!(names.len(), layout.len());
        assert!(!layout.is_empty());
        assert!(!FeatureLayout {
            n_mels: 0,
            reduction: TimeReduction::MeanStd
        }
        .is_empty());
        assert_eq!(names[0], "instrument_source");
        assert_eq!(names[3], "quality_bright");
        assert_eq!(names[12], "quality_tempo-synced");
        assert_eq!(names[13], "mel_mean_000");
    }
}
