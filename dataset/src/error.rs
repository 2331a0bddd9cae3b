use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed dataset index {path}: {source}")]
    Index {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown {what} id {id}")]
    UnknownId { what: &'static str, id: u8 },

    #[error("unknown {what} {name:?}")]
    UnknownName { what: &'static str, name: String },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: symphonia::core::errors::Error,
    },

    #[error("{path} has no decodable audio track")]
    NoTrack { path: PathBuf },

    #[error("{path} does not declare a sample rate")]
    UnknownSampleRate { path: PathBuf },

    #[error("{path} decoded to zero samples")]
    EmptyAudio { path: PathBuf },

    #[error("failed to set up resampler {from} Hz -> {to} Hz: {source}")]
    ResamplerSetup {
        from: u32,
        to: u32,
        #[source]
        source: rubato::ResamplerConstructionError,
    },

    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),

    #[error("test fraction must be within (0, 1), got {0}")]
    InvalidTestFraction(f64),
}

pub type Result<T> = std::result::Result<T, Error>;
