use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("fft length must be non-zero")]
    ZeroFftLen,

    #[error("hop length must be non-zero")]
    ZeroHopLen,

    #[error("signal of {samples} samples is shorter than one {fft_len}-sample window")]
    SignalTooShort { samples: usize, fft_len: usize },

    #[error("mel filter bank needs at least one band")]
    ZeroMels,

    #[error("invalid mel frequency range {f_min}..{f_max} Hz for sample rate {sample_rate}")]
    InvalidFrequencyRange {
        f_min: f32,
        f_max: f32,
        sample_rate: u32,
    },

    #[error("spectrogram frame has {got} bins, filter bank expects {expected}")]
    BinMismatch { expected: usize, got: usize },

    #[error("amin must be positive, got {0}")]
    InvalidAmin(f32),

    #[error("top_db must be non-negative, got {0}")]
    InvalidTopDb(f32),
}

pub type Result<T> = std::result::Result<T, Error>;
