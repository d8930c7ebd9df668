use thiserror::Error;

/// Rejected suppressor configuration. Raised once at construction, never
/// while audio is flowing.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("num_bands must be at least 1, got {0}")]
    InvalidBandCount(usize),

    #[error("block_size must be at least 1")]
    InvalidBlockSize,

    #[error("sample rate must be positive, got {0} Hz")]
    InvalidSampleRate(f64),

    #[error("frequency range must satisfy 0 < min < max, got ({min}, {max}) Hz")]
    InvalidFrequencyRange { min: f64, max: f64 },

    #[error("monitored frequency {frequency_hz} Hz is at or above Nyquist ({nyquist_hz} Hz)")]
    AboveNyquist { frequency_hz: f64, nyquist_hz: f64 },

    #[error("filter Q must be positive, got {0}")]
    InvalidQ(f64),

    #[error("max gain reduction must be negative dB, got {0} dB")]
    InvalidMaxGainReduction(f64),

    #[error("energy thresholds must satisfy 0 <= energy_off < energy_on, got on={on}, off={off}")]
    InvalidThresholds { on: f64, off: f64 },

    #[error("{name} out of range: {value}")]
    InvalidRate { name: &'static str, value: f64 },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
