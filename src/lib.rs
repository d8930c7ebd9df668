//! Acoustic feedback suppression for live audio.
//!
//! A fixed bank of narrow notch filters sits on evenly spaced frequencies.
//! Each block, a windowed FFT checks those frequencies for runaway tones; a
//! band that howls has its notch pulled down toward the configured maximum
//! cut and released again once the tone is gone.
//!
//! ```no_run
//! use feedback_guard::{FeedbackSuppressor, SuppressorConfig};
//!
//! let config = SuppressorConfig::default();
//! let mut suppressor = FeedbackSuppressor::new(config.clone()).unwrap();
//! let mut block = vec![0.0f64; config.block_size];
//! suppressor.process(&mut block);
//! ```

pub mod biquad;
pub mod config;
pub mod detector;
pub mod error;
pub mod feedback_suppressor;
pub mod gain;
pub mod notch;

pub use config::SuppressorConfig;
pub use error::ConfigError;
pub use feedback_suppressor::{Band, BandSnapshot, FeedbackSuppressor};
