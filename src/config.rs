use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Suppressor settings. Immutable once an engine has been built from them.
///
/// Every field has a default, so a JSON file only needs the values it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressorConfig {
    pub sample_rate_hz: f64,
    /// Samples per `process` call.
    pub block_size: usize,
    pub num_bands: usize,
    /// (min, max) in Hz; bands are spread evenly across it, endpoints included.
    pub freq_range: (f64, f64),
    /// Notch Q. Higher is narrower.
    pub filter_q: f64,
    /// Deepest cut a notch may reach, in dB. Must be negative.
    pub max_gain_reduction_db: f64,
    /// Normalized bin energy above which a band flips to detected.
    pub energy_on: f64,
    /// Normalized bin energy below which a detected band clears.
    pub energy_off: f64,
    /// Per-block multiplier applied to the gain while detected.
    pub attack_rate: f64,
    /// Divisor bounding the attack step from above.
    pub attack_bound: f64,
    /// Per-block multiplier easing the gain back to unity.
    pub release_rate: f64,
}

impl Default for SuppressorConfig {
    fn default() -> Self {
        SuppressorConfig {
            sample_rate_hz: 44100.0,
            block_size: 512,
            num_bands: 10,
            freq_range: (200.0, 4000.0),
            filter_q: 50.0,
            max_gain_reduction_db: -15.0,
            energy_on: 0.01,
            energy_off: 0.005,
            attack_rate: 0.95,
            attack_bound: 0.9,
            release_rate: 1.05,
        }
    }
}

impl SuppressorConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SuppressorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn nyquist_hz(&self) -> f64 {
        self.sample_rate_hz / 2.0
    }

    /// Linear gain the attack drives toward while a band is detected.
    pub fn target_gain_linear(&self) -> f64 {
        10f64.powf(self.max_gain_reduction_db / 20.0)
    }

    /// Band centre frequencies in ascending order.
    pub fn monitor_frequencies(&self) -> Vec<f64> {
        let (min, max) = self.freq_range;
        match self.num_bands {
            0 => Vec::new(),
            1 => vec![min],
            n => {
                let step = (max - min) / (n - 1) as f64;
                (0..n)
                    .map(|i| if i == n - 1 { max } else { min + step * i as f64 })
                    .collect()
            }
        }
    }

    /// Reject anything that would make the filter design or the detector
    /// ill-defined. Nothing is clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_bands == 0 {
            return Err(ConfigError::InvalidBandCount(self.num_bands));
        }
        if self.block_size == 0 {
            return Err(ConfigError::InvalidBlockSize);
        }
        // NaN fails every comparison, so test for the accepted range
        if !(self.sample_rate_hz > 0.0) || !self.sample_rate_hz.is_finite() {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate_hz));
        }

        let (min, max) = self.freq_range;
        if !(min > 0.0 && min < max) || !max.is_finite() {
            return Err(ConfigError::InvalidFrequencyRange { min, max });
        }
        // bands ascend, so only the top one can reach Nyquist
        let nyquist_hz = self.nyquist_hz();
        let top_hz = if self.num_bands == 1 { min } else { max };
        if top_hz >= nyquist_hz {
            return Err(ConfigError::AboveNyquist {
                frequency_hz: top_hz,
                nyquist_hz,
            });
        }

        if !(self.filter_q > 0.0) || !self.filter_q.is_finite() {
            return Err(ConfigError::InvalidQ(self.filter_q));
        }
        if !(self.max_gain_reduction_db < 0.0) || !self.max_gain_reduction_db.is_finite() {
            return Err(ConfigError::InvalidMaxGainReduction(self.max_gain_reduction_db));
        }
        if !(self.energy_off >= 0.0 && self.energy_off < self.energy_on) || !self.energy_on.is_finite() {
            return Err(ConfigError::InvalidThresholds {
                on: self.energy_on,
                off: self.energy_off,
            });
        }

        if !(self.attack_rate > 0.0 && self.attack_rate < 1.0) {
            return Err(ConfigError::InvalidRate {
                name: "attack_rate",
                value: self.attack_rate,
            });
        }
        if !(self.attack_bound > 0.0) || !self.attack_bound.is_finite() {
            return Err(ConfigError::InvalidRate {
                name: "attack_bound",
                value: self.attack_bound,
            });
        }
        if !(self.release_rate > 1.0) || !self.release_rate.is_finite() {
            return Err(ConfigError::InvalidRate {
                name: "release_rate",
                value: self.release_rate,
            });
        }

        Ok(())
    }
}
