//! Linear attack, decay, sustain, release envelope of a single voice slot.

use crate::utils::db_to_linear;

// -------------------------------------------------------------------------------------------------

/// Current processing stage in a [`SlotEnvelope`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    #[default]
    /// Before attack and after release (zero volume).
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

// -------------------------------------------------------------------------------------------------

/// Envelope segment lengths in samples and the sustain level as linear gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeTimes {
    attack: f64,
    decay: f64,
    sustain_level: f32,
    release: f64,
}

impl EnvelopeTimes {
    /// Convert millisecond times and a sustain level in dB. Each segment lasts at least one sample.
    pub fn new(
        sample_rate: u32,
        attack_ms: f32,
        decay_ms: f32,
        sustain_db: f32,
        release_ms: f32,
    ) -> Self {
        let to_samples = |ms: f32| (ms as f64 / 1000.0 * sample_rate as f64).max(1.0);
        Self {
            attack: to_samples(attack_ms),
            decay: to_samples(decay_ms),
            sustain_level: db_to_linear(sustain_db),
            release: to_samples(release_ms),
        }
    }

    pub fn sustain_level(&self) -> f32 {
        self.sustain_level
    }
}

// -------------------------------------------------------------------------------------------------

/// Linear ADSR envelope state.
///
/// The attack and decay shape is a function of the elapsed time since note-on, so changing
/// envelope times while a note plays moves the envelope along the new shape. The release ramps
/// from the value the envelope had when the release started down to zero.
#[derive(Debug, Default, Clone)]
pub struct SlotEnvelope {
    stage: EnvelopeStage,
    clock: f64,
    value: f32,
    release_start_value: f32,
    release_clock: f64,
}

impl SlotEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Last calculated output value.
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    /// Start the envelope from zero.
    pub fn note_on(&mut self) {
        self.stage = EnvelopeStage::Attack;
        self.clock = 0.0;
        self.value = 0.0;
        self.release_start_value = 0.0;
        self.release_clock = 0.0;
    }

    /// Enter the release stage, starting from the current value. Does nothing when idle or
    /// already releasing.
    pub fn note_off(&mut self) {
        if !matches!(self.stage, EnvelopeStage::Idle | EnvelopeStage::Release) {
            self.stage = EnvelopeStage::Release;
            self.release_start_value = self.value;
            self.release_clock = 0.0;
        }
    }

    /// Immediately stop the envelope without a release.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Calculate the value for the current sample and advance by one sample.
    #[inline]
    pub fn process(&mut self, times: &EnvelopeTimes) -> f32 {
        self.value = match self.stage {
            EnvelopeStage::Idle => 0.0,
            EnvelopeStage::Attack | EnvelopeStage::Decay | EnvelopeStage::Sustain => {
                if self.clock < times.attack {
                    self.stage = EnvelopeStage::Attack;
                    (self.clock / times.attack) as f32
                } else if self.clock - times.attack < times.decay {
                    self.stage = EnvelopeStage::Decay;
                    let progress = ((self.clock - times.attack) / times.decay) as f32;
                    1.0 - progress * (1.0 - times.sustain_level)
                } else {
                    self.stage = EnvelopeStage::Sustain;
                    times.sustain_level
                }
            }
            EnvelopeStage::Release => {
                let progress = (self.release_clock / times.release) as f32;
                if progress >= 1.0 {
                    self.stage = EnvelopeStage::Idle;
                    0.0
                } else {
                    self.release_start_value * (1.0 - progress)
                }
            }
        };
        match self.stage {
            EnvelopeStage::Idle => {}
            EnvelopeStage::Release => {
                self.clock += 1.0;
                self.release_clock += 1.0;
            }
            _ => self.clock += 1.0,
        }
        self.value
    }
}

// -------------------------------------------------------------------------------------------------
