//! Oscillators for modulation.

use std::f64::consts::TAU;

use rand::{rngs::SmallRng, Rng, SeedableRng};

// -------------------------------------------------------------------------------------------------

/// Waveform types for LFO oscillators.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::VariantNames,
    strum::FromRepr,
)]
pub enum LfoWaveform {
    #[default]
    Sine,
    Triangle,
    Square,
    #[strum(serialize = "Sample & Hold")]
    SampleAndHold,
}

// -------------------------------------------------------------------------------------------------

/// Simple, non band-limited oscillator which can be used as LFO in voices and effects.
///
/// The phase runs in `[0, 1)` and advances by `rate / sample_rate` per sample. Values are bipolar.
#[derive(Debug, Clone)]
pub struct Lfo {
    sample_rate: u32,
    phase: f64,
    last_phase: f64,
    phase_inc: f64,
    waveform: LfoWaveform,
    hold_value: f64,
    rng: SmallRng,
}

impl Lfo {
    /// Create a new LFO with a randomly seeded sample and hold generator.
    pub fn new(sample_rate: u32, rate: f64, waveform: LfoWaveform) -> Self {
        Self::with_rng(sample_rate, rate, waveform, SmallRng::from_os_rng())
    }

    /// Create a new LFO with a deterministic sample and hold generator.
    pub fn with_seed(sample_rate: u32, rate: f64, waveform: LfoWaveform, seed: u64) -> Self {
        Self::with_rng(sample_rate, rate, waveform, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(sample_rate: u32, rate: f64, waveform: LfoWaveform, rng: SmallRng) -> Self {
        debug_assert!(sample_rate > 0, "Invalid LFO sample rate");
        Self {
            sample_rate,
            phase: 0.0,
            last_phase: 0.0,
            phase_inc: rate / sample_rate as f64,
            waveform,
            hold_value: 0.0,
            rng,
        }
    }

    /// Set a new rate in Hz.
    pub fn set_rate(&mut self, rate: f64) {
        self.phase_inc = rate / self.sample_rate as f64;
    }

    /// Set a new waveform. The phase is kept.
    pub fn set_waveform(&mut self, waveform: LfoWaveform) {
        self.waveform = waveform;
    }

    /// Set the LFO's phase in cycles. Values are wrapped into `[0, 1)`.
    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase.rem_euclid(1.0);
        self.last_phase = self.phase;
    }

    /// Current phase in cycles.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Reset phase and held value.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.last_phase = 0.0;
        self.hold_value = 0.0;
    }

    /// Returns the current value without advancing the phase.
    pub fn peek(&self) -> f64 {
        match self.waveform {
            LfoWaveform::Sine => (TAU * self.phase).sin(),
            LfoWaveform::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
            LfoWaveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoWaveform::SampleAndHold => self.hold_value,
        }
    }

    /// Returns the current value and advances the phase.
    pub fn next_value(&mut self) -> f64 {
        if self.waveform == LfoWaveform::SampleAndHold && self.phase < self.last_phase {
            // phase wrapped around: draw a new value
            self.hold_value = self.rng.random_range(-1.0..=1.0);
        }
        self.last_phase = self.phase;
        let value = self.peek();
        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        value
    }
}

// -------------------------------------------------------------------------------------------------
