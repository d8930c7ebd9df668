use serde::Serialize;
use tracing::{debug, info};

use crate::biquad::{self, BiquadState};
use crate::config::SuppressorConfig;
use crate::detector::{BandEnergyDetector, Hysteresis};
use crate::error::ConfigError;
use crate::gain::GainController;
use crate::notch::NotchDesign;

/// One monitored frequency and everything that persists for it across blocks.
#[derive(Clone, Debug)]
pub struct Band {
    pub(crate) frequency_hz: f64,
    pub(crate) design: NotchDesign,
    pub(crate) filter_state: BiquadState,
    pub(crate) detected: bool,
    pub(crate) gain_reduction_linear: f64,
}

impl Band {
    fn new(frequency_hz: f64, config: &SuppressorConfig) -> Self {
        Band {
            frequency_hz,
            design: NotchDesign::new(frequency_hz, config.sample_rate_hz, config.filter_q),
            filter_state: BiquadState::default(),
            detected: false,
            gain_reduction_linear: 1.0,
        }
    }

    fn reset(&mut self) {
        self.filter_state.reset();
        self.detected = false;
        self.gain_reduction_linear = 1.0;
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn filter_state(&self) -> BiquadState {
        self.filter_state
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    /// 1.0 means no attenuation.
    pub fn gain_reduction_linear(&self) -> f64 {
        self.gain_reduction_linear
    }

    pub fn snapshot(&self) -> BandSnapshot {
        BandSnapshot {
            frequency_hz: self.frequency_hz,
            detected: self.detected,
            gain_reduction_linear: self.gain_reduction_linear,
        }
    }
}

/// Read-only view of a band for logging and telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BandSnapshot {
    pub frequency_hz: f64,
    pub detected: bool,
    pub gain_reduction_linear: f64,
}

/// Adaptive notch bank for one audio stream.
///
/// Each `process` call runs detection on the untouched input, then for every
/// band in ascending frequency order updates its gain, redesigns its notch
/// and filters the block in place. Blocks must arrive in stream order; build
/// one instance per stream.
pub struct FeedbackSuppressor {
    config: SuppressorConfig,
    bands: Vec<Band>,
    detector: BandEnergyDetector,
    gain: GainController,
    /// f64 working copy for `process_f32`
    work: Vec<f64>,
}

impl FeedbackSuppressor {
    pub fn new(config: SuppressorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let frequencies = config.monitor_frequencies();
        info!(?frequencies, "monitoring frequencies (Hz)");

        let bands = frequencies.iter().map(|&f| Band::new(f, &config)).collect();
        let detector = BandEnergyDetector::new(
            config.sample_rate_hz,
            config.block_size,
            &frequencies,
            Hysteresis::new(config.energy_on, config.energy_off),
        );
        debug!(bins = ?detector.bins(), "detector bins");

        Ok(FeedbackSuppressor {
            gain: GainController::new(&config),
            work: vec![0.0; config.block_size],
            config,
            bands,
            detector,
        })
    }

    pub fn config(&self) -> &SuppressorConfig {
        &self.config
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// Per-band state after the most recent block.
    pub fn snapshot(&self) -> impl Iterator<Item = BandSnapshot> + '_ {
        self.bands.iter().map(Band::snapshot)
    }

    /// Energies the detector measured on the most recent block, in band order.
    pub fn band_energies(&self) -> &[f64] {
        self.detector.energies()
    }

    /// Back to the freshly constructed state.
    pub fn reset(&mut self) {
        for band in &mut self.bands {
            band.reset();
        }
    }

    /// Suppress feedback in `block` in place.
    ///
    /// An empty block is a no-op. Any other length must equal
    /// `config.block_size`; a mismatch panics rather than padding, since that
    /// would shift every band's filter state out of alignment.
    ///
    /// Non-finite input samples are replaced with silence, and a band whose
    /// registers still end up non-finite is reset, so a glitch never outlives
    /// its block.
    pub fn process(&mut self, block: &mut [f64]) {
        if block.is_empty() {
            return;
        }
        assert_eq!(
            block.len(),
            self.config.block_size,
            "block length does not match the configured block size"
        );

        let mut replaced = 0usize;
        for sample in block.iter_mut().filter(|s| !s.is_finite()) {
            *sample = 0.0;
            replaced += 1;
        }
        if replaced > 0 {
            debug!(replaced, "non-finite input samples zeroed");
        }

        self.detector.detect(block, &mut self.bands);

        // strictly sequential: each band filters the previous band's output
        for band in &mut self.bands {
            band.gain_reduction_linear = self.gain.update(band.gain_reduction_linear, band.detected);
            let gain_db = self.gain.gain_db(band.gain_reduction_linear);
            let coeffs = band.design.coefficients(gain_db);
            band.filter_state = biquad::apply(block, &coeffs, band.filter_state);

            if !(band.filter_state.w1.is_finite() && band.filter_state.w2.is_finite()) {
                debug!(frequency_hz = band.frequency_hz, "filter state diverged, resetting");
                band.filter_state.reset();
            }
        }
    }

    /// Copying form of [`process`](Self::process).
    pub fn process_block(&mut self, input: &[f64], output: &mut [f64]) {
        assert_eq!(input.len(), output.len());
        output.copy_from_slice(input);
        self.process(output);
    }

    /// [`process`](Self::process) for `f32` audio, via a preallocated `f64`
    /// buffer. Does not allocate.
    pub fn process_f32(&mut self, block: &mut [f32]) {
        if block.is_empty() {
            return;
        }
        assert_eq!(
            block.len(),
            self.config.block_size,
            "block length does not match the configured block size"
        );

        let mut work = std::mem::take(&mut self.work);
        for (w, &x) in work.iter_mut().zip(block.iter()) {
            *w = f64::from(x);
        }
        self.process(&mut work);
        for (y, &w) in block.iter_mut().zip(work.iter()) {
            *y = w as f32;
        }
        self.work = work;
    }
}
