// attack -> how fast a detected band dives toward the deepest cut
// release -> how fast it eases back to unity once the howl is gone

use crate::config::SuppressorConfig;

/// Gains at or below this are treated as "fully cut" when converting to dB.
pub const GAIN_FLOOR: f64 = 1e-10;

/// Per-block smoothing of a band's linear gain factor.
///
/// Holds only config-derived constants; the gain itself lives on the band.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainController {
    /// Linear gain the attack aims for
    target_linear: f64,
    max_gain_reduction_db: f64,
    attack_rate: f64,
    attack_bound: f64,
    release_rate: f64,
}

impl GainController {
    pub fn new(config: &SuppressorConfig) -> Self {
        GainController {
            target_linear: config.target_gain_linear(),
            max_gain_reduction_db: config.max_gain_reduction_db,
            attack_rate: config.attack_rate,
            attack_bound: config.attack_bound,
            release_rate: config.release_rate,
        }
    }

    pub fn target_linear(&self) -> f64 {
        self.target_linear
    }

    /// One block of smoothing. Returns the new gain, kept in `[GAIN_FLOOR, 1]`.
    ///
    /// While detected the gain is first pulled down by `attack_rate` but not
    /// below the target, then re-bounded at `gain / attack_bound` capped by
    /// the target. With `attack_bound < 1` that second step always lands on
    /// the target; with `attack_bound > 1` it can settle below it.
    #[inline]
    pub fn update(&self, gain: f64, detected: bool) -> f64 {
        let next = if detected {
            let stepped = self.target_linear.max(gain * self.attack_rate);
            (stepped / self.attack_bound).min(self.target_linear)
        } else {
            (gain * self.release_rate).min(1.0)
        };
        next.clamp(GAIN_FLOOR, 1.0)
    }

    /// Cut in dB for the notch designer. Never positive.
    #[inline]
    pub fn gain_db(&self, gain: f64) -> f64 {
        let gain_db = if gain > GAIN_FLOOR {
            20.0 * gain.log10()
        } else {
            self.max_gain_reduction_db
        };
        gain_db.min(0.0)
    }
}
