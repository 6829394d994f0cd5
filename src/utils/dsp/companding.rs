//! μ-law style compressor/expander pair, as used around bucket-brigade delay lines to lift quiet
//! signals above the line's noise floor.

// -------------------------------------------------------------------------------------------------

/// Logarithmic compander with a fixed μ.
///
/// `compress(x) = sign(x) * ln(1 + μ|x|) / ln(1 + μ)`
/// `expand(y) = sign(y) * ((1 + μ)^|y| - 1) / μ`
#[derive(Debug, Clone, Copy)]
pub struct Compander {
    mu: f32,
    norm: f32,
}

impl Compander {
    /// Create a new compander. `mu` must be > 0.
    pub fn new(mu: f32) -> Self {
        debug_assert!(mu > 0.0, "Invalid compander mu");
        Self {
            mu,
            norm: 1.0 / mu.ln_1p(),
        }
    }

    #[inline]
    pub fn compress(&self, x: f32) -> f32 {
        x.signum() * (self.mu * x.abs()).ln_1p() * self.norm
    }

    #[inline]
    pub fn expand(&self, y: f32) -> f32 {
        y.signum() * ((1.0 + self.mu).powf(y.abs()) - 1.0) / self.mu
    }
}

// -------------------------------------------------------------------------------------------------
