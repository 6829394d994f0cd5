use std::f32;

// -------------------------------------------------------------------------------------------------

/// Available response types for the [`SvfFilter`].
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::VariantNames,
    strum::FromRepr,
)]
pub enum SvfFilterType {
    #[default]
    LowPass,
    HighPass,
    BandPass,
}

// -------------------------------------------------------------------------------------------------

/// Coefficients of a [`SvfFilter`], shared by all channels of a filter bank.
///
/// Cutoff and resonance are clamped instead of rejected: cutoff to `[20 Hz, 0.49 * sample_rate]`,
/// resonance to `[0, 1]`, which maps to a damping of `k = max(0.1, 2 - 2 * resonance)`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SvfCoefficients {
    filter_type: SvfFilterType,
    sample_rate: u32,
    cutoff: f32,
    resonance: f32,
    a1: f32,
    a2: f32,
    a3: f32,
    m0: f32,
    m1: f32,
    m2: f32,
}

impl SvfCoefficients {
    pub const MIN_CUTOFF: f32 = 20.0;
    pub const MAX_CUTOFF_RATIO: f32 = 0.49;

    /// Create new coefficients for the given response.
    pub fn new(filter_type: SvfFilterType, sample_rate: u32, cutoff: f32, resonance: f32) -> Self {
        let mut coefficients = Self::default();
        coefficients.set(filter_type, sample_rate, cutoff, resonance);
        coefficients
    }

    /// Currently applied filter type.
    pub fn filter_type(&self) -> SvfFilterType {
        self.filter_type
    }

    /// Currently applied, clamped cutoff frequency in Hz.
    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    /// Currently applied, clamped resonance.
    pub fn resonance(&self) -> f32 {
        self.resonance
    }

    /// Set and apply a batch of new filter parameters. Does nothing when nothing changed.
    pub fn set(
        &mut self,
        filter_type: SvfFilterType,
        sample_rate: u32,
        cutoff: f32,
        resonance: f32,
    ) {
        debug_assert!(sample_rate > 0, "Invalid filter sample rate");
        let max_cutoff = sample_rate as f32 * Self::MAX_CUTOFF_RATIO;
        let cutoff = if cutoff.is_finite() {
            cutoff.clamp(Self::MIN_CUTOFF, max_cutoff)
        } else {
            Self::MIN_CUTOFF
        };
        let resonance = if resonance.is_finite() {
            resonance.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if self.filter_type != filter_type
            || self.sample_rate != sample_rate
            || self.cutoff != cutoff
            || self.resonance != resonance
        {
            self.filter_type = filter_type;
            self.sample_rate = sample_rate;
            self.cutoff = cutoff;
            self.resonance = resonance;
            self.apply();
        }
    }

    fn apply(&mut self) {
        let g = f32::tan(f32::consts::PI * self.cutoff / self.sample_rate as f32);
        let k = (2.0 - 2.0 * self.resonance).max(0.1);
        self.a1 = 1.0 / (1.0 + g * (g + k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
        (self.m0, self.m1, self.m2) = match self.filter_type {
            SvfFilterType::LowPass => (0.0, 0.0, 1.0),
            SvfFilterType::HighPass => (1.0, -k, -1.0),
            SvfFilterType::BandPass => (0.0, 1.0, 0.0),
        };
    }
}

// -------------------------------------------------------------------------------------------------

/// Topology-preserving-transform state variable filter (Andrew Simper, Cytomic).
/// See <http://cytomic.com/files/dsp/SvfLinearTrapOptimised2.pdf>
///
/// Holds the two integrator states of a single channel. Coefficients are passed in, so a stereo
/// pair can share them.
#[derive(Debug, Default, Clone)]
pub struct SvfFilter {
    ic1eq: f32,
    ic2eq: f32,
}

impl SvfFilter {
    pub const fn new() -> Self {
        Self {
            ic1eq: 0.0,
            ic2eq: 0.0,
        }
    }

    /// Reset the filter's integrator states.
    #[inline]
    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }

    /// Apply the filter on a single sample.
    ///
    /// Non-finite inputs or states are replaced with zero. A non-finite result falls back to the
    /// unfiltered input.
    #[inline]
    pub fn process_sample(&mut self, coefficients: &SvfCoefficients, input: f32) -> f32 {
        let v0 = if input.is_finite() { input } else { 0.0 };
        if !self.ic1eq.is_finite() || !self.ic2eq.is_finite() {
            self.reset();
        }
        let v3 = v0 - self.ic2eq;
        let v1 = coefficients.a1 * self.ic1eq + coefficients.a2 * v3;
        let v2 = self.ic2eq + coefficients.a2 * self.ic1eq + coefficients.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;
        let output = coefficients.m0 * v0 + coefficients.m1 * v1 + coefficients.m2 * v2;
        if output.is_finite() {
            output
        } else {
            v0
        }
    }
}

// -------------------------------------------------------------------------------------------------
