/// Normalized second-order section coefficients. `a[0]` is always 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoefficients {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl BiquadCoefficients {
    /// Pass-through section.
    pub const fn identity() -> Self {
        BiquadCoefficients {
            b: [1.0, 0.0, 0.0],
            a: [1.0, 0.0, 0.0],
        }
    }
}

impl Default for BiquadCoefficients {
    fn default() -> Self {
        Self::identity()
    }
}

/// The two recursion registers of a transposed direct form II section.
/// Carried from one block to the next for the same band.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BiquadState {
    pub w1: f64,
    pub w2: f64,
}

impl BiquadState {
    pub fn reset(&mut self) {
        *self = BiquadState::default();
    }
}

/// Filter `samples` in place and return the registers to carry into the
/// next call.
///
/// Transposed direct form II:
/// ```text
/// y[n] = b0*x[n] + w1
/// w1   = b1*x[n] - a1*y[n] + w2
/// w2   = b2*x[n] - a2*y[n]
/// ```
/// No allocation, no failure modes; `coeffs.a[0]` is assumed to be 1.
#[inline]
pub fn apply(samples: &mut [f64], coeffs: &BiquadCoefficients, state: BiquadState) -> BiquadState {
    let [b0, b1, b2] = coeffs.b;
    let [_, a1, a2] = coeffs.a;
    let BiquadState { mut w1, mut w2 } = state;

    for sample in samples.iter_mut() {
        let x = *sample;
        let y = b0 * x + w1;
        w1 = b1 * x - a1 * y + w2;
        w2 = b2 * x - a2 * y;
        *sample = y;
    }

    BiquadState { w1, w2 }
}
