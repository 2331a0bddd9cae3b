use rustfft::FftNum;

pub mod db;
mod error;
pub mod features;
pub mod mel;
pub mod spectrogram;

pub use db::{power_to_db, DbConfig, Reference};
pub use error::{Error, Result};
pub use features::{
    FeatureConfig, FeatureExtractor, FeatureLayout, FeatureVector, NoteMetadata, TimeReduction,
    METADATA_LEN, QUALITY_COUNT, QUALITY_NAMES,
};
pub use mel::{MelConfig, MelFilterBank, MelScale};
pub use spectrogram::{SpectrogramConfig, SpectrogramGenerator};

pub trait Float: FftNum + num_traits::Float {}
impl Float for f32 {}
impl Float for f64 {}
