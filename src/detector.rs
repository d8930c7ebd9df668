use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tracing::{info, trace};

use crate::feedback_suppressor::Band;

/// Two-threshold switch. Energy between `energy_off` and `energy_on` leaves
/// the flag where it is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hysteresis {
    energy_on: f64,
    energy_off: f64,
}

impl Hysteresis {
    pub fn new(energy_on: f64, energy_off: f64) -> Self {
        Hysteresis {
            energy_on,
            energy_off,
        }
    }

    /// Next value of the flag given this block's energy.
    #[inline]
    pub fn update(&self, detected: bool, energy: f64) -> bool {
        if energy > self.energy_on && !detected {
            true
        } else if energy < self.energy_off && detected {
            false
        } else {
            detected
        }
    }
}

/// Symmetric Hann window, as used for spectral analysis of one block.
pub fn hann_window(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        n => {
            let denom = (n - 1) as f64;
            (0..n)
                .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / denom).cos())
                .collect()
        }
    }
}

/// Index of the FFT bin whose centre frequency is closest to `frequency_hz`.
///
/// Only the non-negative half of the spectrum is considered; for even sizes
/// bin `n/2` represents -Nyquist and is never the closest match. Ties go to
/// the lower bin.
pub fn nearest_bin(frequency_hz: f64, sample_rate_hz: f64, fft_size: usize) -> usize {
    if fft_size == 0 {
        return 0;
    }
    let max_bin = (fft_size - 1) / 2;
    let exact = frequency_hz * fft_size as f64 / sample_rate_hz;
    let lower = exact.floor();
    let bin = if exact - lower <= 0.5 { lower } else { lower + 1.0 };
    (bin.max(0.0) as usize).min(max_bin)
}

/// Windowed-FFT energy meter for a fixed set of frequencies.
///
/// All buffers are sized at construction; `measure` and `detect` do not
/// allocate.
pub struct BandEnergyDetector {
    block_size: usize,
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    bins: Vec<usize>,
    energies: Vec<f64>,
    hysteresis: Hysteresis,
}

impl BandEnergyDetector {
    pub fn new(
        sample_rate_hz: f64,
        block_size: usize,
        frequencies: &[f64],
        hysteresis: Hysteresis,
    ) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(block_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        BandEnergyDetector {
            block_size,
            fft,
            window: hann_window(block_size),
            buffer: vec![Complex::new(0.0, 0.0); block_size],
            scratch,
            bins: frequencies
                .iter()
                .map(|&f| nearest_bin(f, sample_rate_hz, block_size))
                .collect(),
            energies: vec![0.0; frequencies.len()],
            hysteresis,
        }
    }

    /// Bin index used for each band, in band order.
    pub fn bins(&self) -> &[usize] {
        &self.bins
    }

    /// Energies from the most recent non-empty block.
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// `|X[bin]|^2 / N` per band for a Hann-windowed copy of `block`.
    /// The block itself is left untouched. An empty block does nothing.
    pub fn measure(&mut self, block: &[f64]) -> &[f64] {
        if block.is_empty() {
            return &self.energies;
        }
        assert_eq!(block.len(), self.block_size, "block length does not match the planned FFT size");

        for ((slot, &x), &w) in self.buffer.iter_mut().zip(block).zip(&self.window) {
            *slot = Complex::new(x * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let n = self.block_size as f64;
        for (energy, &bin) in self.energies.iter_mut().zip(&self.bins) {
            *energy = self.buffer[bin].norm_sqr() / n;
        }
        &self.energies
    }

    /// Measure `block` and step every band's detection flag through the
    /// hysteresis. Bands are independent of one another here.
    pub fn detect(&mut self, block: &[f64], bands: &mut [Band]) {
        if block.is_empty() {
            return;
        }
        let hysteresis = self.hysteresis;
        let energies = self.measure(block);

        for (band, &energy) in bands.iter_mut().zip(energies) {
            let next = hysteresis.update(band.detected, energy);
            if next != band.detected {
                if next {
                    info!(frequency_hz = band.frequency_hz, energy, "feedback detected");
                } else {
                    info!(frequency_hz = band.frequency_hz, energy, "feedback subsided");
                }
            }
            trace!(frequency_hz = band.frequency_hz, energy, detected = next, "band energy");
            band.detected = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frequency_hz: f64, amplitude: f64, sample_rate_hz: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|n| amplitude * (2.0 * PI * frequency_hz * n as f64 / sample_rate_hz).sin())
            .collect()
    }

    #[test]
    fn hysteresis_holds_inside_dead_band() {
        let h = Hysteresis::new(0.01, 0.005);
        assert!(!h.update(false, 0.007));
        assert!(h.update(true, 0.007));
        assert!(h.update(false, 0.012));
        assert!(!h.update(true, 0.004));
        assert!(h.update(true, 0.012));
    }

    #[test]
    fn hann_matches_reference_values() {
        let w = hann_window(5);
        let expected = [0.0, 0.5, 1.0, 0.5, 0.0];
        for (got, want) in w.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-12);
        }
        assert_eq!(hann_window(1), vec![1.0]);
        assert!(hann_window(0).is_empty());
    }

    #[test]
    fn nearest_bin_rounds_to_closest_positive_bin() {
        // 44100 / 512 = 86.13 Hz per bin
        assert_eq!(nearest_bin(1000.0, 44100.0, 512), 12);
        assert_eq!(nearest_bin(0.0, 44100.0, 512), 0);
        assert_eq!(nearest_bin(22049.0, 44100.0, 512), 255);
        // exactly halfway between bins 1 and 2
        assert_eq!(nearest_bin(150.0, 1000.0, 10), 1);
    }

    #[test]
    fn energy_of_on_bin_tone() {
        // bin 16 of a 256-point FFT at 8 kHz is exactly 500 Hz
        let mut detector = BandEnergyDetector::new(8000.0, 256, &[500.0], Hysteresis::new(0.01, 0.005));
        let block = tone(500.0, 1.0, 8000.0, 256);
        let energy = detector.measure(&block)[0];
        // coherent gain of the Hann window is ~0.5, so |X| ~= N/4
        let expected = (256.0f64 / 4.0).powi(2) / 256.0;
        assert!((energy - expected).abs() / expected < 0.02, "energy {energy}, expected {expected}");
    }

    #[test]
    fn measure_does_not_touch_block() {
        let mut detector = BandEnergyDetector::new(44100.0, 512, &[1000.0], Hysteresis::new(0.01, 0.005));
        let block = tone(1000.0, 0.5, 44100.0, 512);
        let copy = block.clone();
        detector.measure(&block);
        assert_eq!(block, copy);
    }

    #[test]
    fn silence_has_zero_energy() {
        let mut detector =
            BandEnergyDetector::new(44100.0, 512, &[500.0, 1000.0, 2000.0], Hysteresis::new(0.01, 0.005));
        let energies = detector.measure(&[0.0; 512]);
        assert!(energies.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn empty_block_is_ignored() {
        let mut detector = BandEnergyDetector::new(44100.0, 512, &[1000.0], Hysteresis::new(0.01, 0.005));
        detector.measure(&tone(1000.0, 0.5, 44100.0, 512));
        let before = detector.energies().to_vec();
        detector.measure(&[]);
        assert_eq!(detector.energies(), &before[..]);
    }

    #[test]
    #[should_panic(expected = "block length")]
    fn wrong_block_length_panics() {
        let mut detector = BandEnergyDetector::new(44100.0, 512, &[1000.0], Hysteresis::new(0.01, 0.005));
        detector.measure(&[0.0; 256]);
    }
}
