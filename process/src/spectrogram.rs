use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{Error, Float, Result};

#[derive(Clone)]
pub struct SpectrogramGenerator<T: Float> {
    planner: Arc<Mutex<FftPlanner<T>>>,
    hanns: Arc<RwLock<HashMap<usize, Arc<Vec<T>>>>>,
}

impl<T: Float> Default for SpectrogramGenerator<T> {
    fn default() -> Self {
        Self {
            planner: Arc::new(Mutex::new(FftPlanner::new())),
            hanns: Default::default(),
        }
    }
}

impl<T: Float> SpectrogramGenerator<T> {
    /// Power spectrogram `|X|^2`, one `fft_len / 2 + 1` bin row per frame.
    #[instrument(skip(self, samples), level = "trace")]
    pub fn power(&self, samples: &[f32], config: &SpectrogramConfig) -> Result<Vec<Vec<T>>> {
        self.run(samples, config, |bin| bin.norm_sqr())
    }

    #[instrument(skip(self, samples), level = "trace")]
    pub fn magnitude(&self, samples: &[f32], config: &SpectrogramConfig) -> Result<Vec<Vec<T>>> {
        self.run(samples, config, |bin| bin.norm())
    }

    fn run(
        &self,
        samples: &[f32],
        config: &SpectrogramConfig,
        reduce: impl Fn(num_complex::Complex<T>) -> T,
    ) -> Result<Vec<Vec<T>>> {
        config.validate()?;
        let padded = config.pad(samples);
        if padded.len() < config.fft_len {
            return Err(Error::SignalTooShort {
                samples: samples.len(),
                fft_len: config.fft_len,
            });
        }

        let fft = self
            .planner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .plan_fft_forward(config.fft_len);
        let hann = self.get_hann(config.fft_len);
        let hann_slice = hann.as_slice();
        let n_bins = config.n_bins();

        let spectrogram = padded
            .windows(config.fft_len)
            .step_by(config.hop_len)
            .map(|window| {
                window
                    .iter()
                    .zip(hann_slice)
                    .map(|(&sample, &hann)| {
                        num_complex::Complex::new(cast::<T>(sample) * hann, T::zero())
                    })
                    .collect::<Vec<_>>()
            })
            .map(|mut window| {
                fft.process(window.as_mut_slice());
                window
            })
            .map(|complex| {
                complex
                    .into_iter()
                    // the upper half mirrors the lower for real input
                    .take(n_bins)
                    .map(&reduce)
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        Ok(spectrogram)
    }

    fn get_hann(&self, size: usize) -> Arc<Vec<T>> {
        let read = self.hanns.read().unwrap_or_else(PoisonError::into_inner);

        match read.get(&size) {
            Some(hann) => hann.clone(),
            None => {
                drop(read);
                self.generate_hann(size)
            }
        }
    }

    #[instrument(skip(self), level = "trace")]
    fn generate_hann(&self, size: usize) -> Arc<Vec<T>> {
        let hann = Arc::new(generate_hanning_window(size));
        let mut write = self.hanns.write().unwrap_or_else(PoisonError::into_inner);
        write.entry(size).or_insert(hann).clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    pub fft_len: usize,
    pub hop_len: usize,
    /// Zero-pad `fft_len / 2` samples on both sides so frame `t` is centred
    /// on sample `t * hop_len`.
    pub center: bool,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            fft_len: 2048,
            hop_len: 512,
            center: true,
        }
    }
}

impl SpectrogramConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fft_len == 0 {
            return Err(Error::ZeroFftLen);
        }
        if self.hop_len == 0 {
            return Err(Error::ZeroHopLen);
        }
        Ok(())
    }

    pub fn n_bins(&self) -> usize {
        self.fft_len / 2 + 1
    }

    /// Number of frames produced for a signal of `samples` samples.
    pub fn n_frames(&self, samples: usize) -> usize {
        let padded = if self.center {
            samples + 2 * (self.fft_len / 2)
        } else {
            samples
        };
        match padded.checked_sub(self.fft_len) {
            Some(rest) if self.hop_len > 0 => 1 + rest / self.hop_len,
            _ => 0,
        }
    }

    fn pad<'a>(&self, samples: &'a [f32]) -> std::borrow::Cow<'a, [f32]> {
        if !self.center {
            return samples.into();
        }
        let pad = self.fft_len / 2;
        let mut padded = vec![0.0; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);
        padded.into()
    }
}

fn cast<T: Float>(value: f32) -> T {
    T::from_f32(value).unwrap_or_else(T::zero)
}

/// Periodic Hann window.
fn generate_hanning_window<T: Float>(size: usize) -> Vec<T> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (std::f32::consts::TAU * (i as f32 / size as f32)).cos()))
        .map(cast::<T>)
        .collect()
}
