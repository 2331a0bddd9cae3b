use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reference {
    /// 0 dB at power 1.0.
    Unit,
    /// 0 dB at the loudest cell of the input.
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub reference: Reference,
    pub amin: f32,
    pub top_db: Option<f32>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            reference: Reference::Unit,
            amin: 1e-10,
            top_db: Some(80.0),
        }
    }
}

impl DbConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.amin > 0.0) {
            return Err(Error::InvalidAmin(self.amin));
        }
        match self.top_db {
            Some(top_db) if !(top_db >= 0.0) => Err(Error::InvalidTopDb(top_db)),
            _ => Ok(()),
        }
    }
}

/// Converts a power spectrogram to decibels in place.
///
/// `top_db` is applied over the whole spectrogram, not per frame.
pub fn power_to_db(spectrogram: &mut [Vec<f32>], config: &DbConfig) -> Result<()> {
    config.validate()?;

    let reference = match config.reference {
        Reference::Unit => 1.0,
        Reference::Max => spectrogram
            .iter()
            .flatten()
            .copied()
            .fold(0.0f32, f32::max),
    };
    let offset = 10.0 * reference.max(config.amin).log10();

    let mut peak = f32::NEG_INFINITY;
    for value in spectrogram.iter_mut().flatten() {
        *value = 10.0 * value.max(config.amin).log10() - offset;
        peak = peak.max(*value);
    }

    if let Some(top_db) = config.top_db {
        let floor = peak - top_db;
        for value in spectrogram.iter_mut().flatten() {
            *value = value.max(floor);
        }
    }

    Ok(())
}
