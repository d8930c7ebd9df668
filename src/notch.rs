//! Peaking-EQ section used as a notch.
//!
//! RBJ cookbook peaking filter. With a negative gain it cuts a narrow band
//! around the centre frequency; at 0 dB numerator and denominator coincide
//! and the section is a pass-through.

use std::f64::consts::PI;

use crate::biquad::BiquadCoefficients;

/// Frequency-dependent terms of one band's notch, fixed at construction so
/// that only the gain-dependent part is recomputed per block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NotchDesign {
    cos_w: f64,
    alpha: f64,
}

impl NotchDesign {
    /// Caller guarantees `filter_q > 0`, `sample_rate_hz > 0` and
    /// `0 < frequency_hz < sample_rate_hz / 2`.
    pub fn new(frequency_hz: f64, sample_rate_hz: f64, filter_q: f64) -> Self {
        let omega = 2.0 * PI * frequency_hz / sample_rate_hz;
        let (sin_w, cos_w) = omega.sin_cos();
        NotchDesign {
            cos_w,
            alpha: sin_w / (2.0 * filter_q),
        }
    }

    /// Normalized coefficients for a cut of `gain_db` (expected `<= 0`).
    pub fn coefficients(&self, gain_db: f64) -> BiquadCoefficients {
        let amp = 10f64.powf(gain_db / 40.0);

        let b0 = 1.0 + self.alpha * amp;
        let b1 = -2.0 * self.cos_w;
        let b2 = 1.0 - self.alpha * amp;
        let a0 = 1.0 + self.alpha / amp;
        let a1 = -2.0 * self.cos_w;
        let a2 = 1.0 - self.alpha / amp;

        BiquadCoefficients {
            b: [b0 / a0, b1 / a0, b2 / a0],
            a: [1.0, a1 / a0, a2 / a0],
        }
    }
}

/// One-shot form of [`NotchDesign`].
pub fn design_notch(
    frequency_hz: f64,
    sample_rate_hz: f64,
    filter_q: f64,
    gain_db: f64,
) -> BiquadCoefficients {
    NotchDesign::new(frequency_hz, sample_rate_hz, filter_q).coefficients(gain_db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biquad::{apply, BiquadState};

    /// |H(e^jw)| at `frequency_hz`.
    fn magnitude_at(coeffs: &BiquadCoefficients, frequency_hz: f64, sample_rate_hz: f64) -> f64 {
        let w = 2.0 * PI * frequency_hz / sample_rate_hz;
        let eval = |c: &[f64; 3]| {
            let re = c[0] + c[1] * w.cos() + c[2] * (2.0 * w).cos();
            let im = -c[1] * w.sin() - c[2] * (2.0 * w).sin();
            (re * re + im * im).sqrt()
        };
        eval(&coeffs.b) / eval(&coeffs.a)
    }

    #[test]
    fn zero_gain_collapses_to_pass_through() {
        let coeffs = design_notch(1000.0, 44100.0, 80.0, 0.0);
        for i in 0..3 {
            assert!((coeffs.b[i] - coeffs.a[i]).abs() < 1e-15);
        }

        let mut impulse = [0.0; 32];
        impulse[0] = 1.0;
        apply(&mut impulse, &coeffs, BiquadState::default());
        assert!((impulse[0] - 1.0).abs() < 1e-12);
        assert!(impulse[1..].iter().all(|y| y.abs() < 1e-12));
    }

    #[test]
    fn centre_gain_equals_requested_cut() {
        let coeffs = design_notch(1000.0, 44100.0, 80.0, -20.0);
        let centre = magnitude_at(&coeffs, 1000.0, 44100.0);
        assert!((20.0 * centre.log10() + 20.0).abs() < 1e-6, "centre gain {centre}");
    }

    #[test]
    fn far_from_centre_is_untouched() {
        let coeffs = design_notch(1000.0, 44100.0, 80.0, -20.0);
        for f in [200.0, 500.0, 2000.0, 8000.0] {
            let mag = magnitude_at(&coeffs, f, 44100.0);
            assert!((mag - 1.0).abs() < 0.01, "{f} Hz -> {mag}");
        }
    }

    #[test]
    fn leading_denominator_is_one() {
        let coeffs = design_notch(3150.0, 48000.0, 12.0, -9.0);
        assert_eq!(coeffs.a[0], 1.0);
    }
}
