//! Simple one-pole (6 dB/octave) low-pass filter.

use std::f32::consts::TAU;

// -------------------------------------------------------------------------------------------------

/// One-pole low-pass stage: `y += g * (x - y)` with `g = ω / (1 + ω)` and `ω = 2π·fc/fs`.
///
/// The retained output is reset to zero whenever it turns non-finite.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnePoleLowpass {
    state: f32,
}

impl OnePoleLowpass {
    pub const fn new() -> Self {
        Self { state: 0.0 }
    }

    /// Calculate the smoothing coefficient for the given cutoff frequency.
    #[inline]
    pub fn coefficient(sample_rate: u32, cutoff: f32) -> f32 {
        let omega = TAU * cutoff / sample_rate as f32;
        omega / (1.0 + omega)
    }

    /// Reset the filter's state.
    pub fn reset(&mut self) {
        self.state = 0.0;
    }

    /// Process a single sample with a precalculated `coefficient`.
    #[inline]
    pub fn process_sample(&mut self, input: f32, coefficient: f32) -> f32 {
        self.state += coefficient * (input - self.state);
        if !self.state.is_finite() {
            self.state = 0.0;
        }
        self.state
    }
}

// -------------------------------------------------------------------------------------------------
