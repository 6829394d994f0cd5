use std::fmt::Debug;

// -------------------------------------------------------------------------------------------------

/// Float parameter scaling, applied to convert normalized UI or automation values to the
/// internal, plain values.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub enum ParameterScaling {
    /// Linear scaling: `y = x` (no transformation applied)
    #[default]
    Linear,

    /// Exponential scaling: `y = x^factor`. Factor must be > 0.0.
    ///
    /// Factors > 1.0 spend more of the normalized range on the lower end of the plain range,
    /// which suits frequencies and times. Factors between 2.0 - 3.0 are typical for Hz.
    Exponential(f32),
}

impl ParameterScaling {
    /// Apply scaling to a normalized f32 value.
    pub fn scale(&self, value: f32) -> f32 {
        debug_assert!(
            (0.0..=1.0).contains(&value),
            "Expecting a normalized value here"
        );
        match self {
            ParameterScaling::Linear => value,
            ParameterScaling::Exponential(factor) => value.powf(*factor),
        }
    }

    /// Apply inverse scaling to a normalized f32 value.
    pub fn unscale(&self, value: f32) -> f32 {
        debug_assert!(
            (0.0..=1.0).contains(&value),
            "Expecting a normalized value here"
        );
        match self {
            ParameterScaling::Linear => value,
            ParameterScaling::Exponential(factor) => value.powf(1.0 / factor.abs().max(0.001)),
        }
    }

    pub(crate) const fn validate(&self) {
        if let ParameterScaling::Exponential(factor) = self {
            assert!(
                *factor > 0.0,
                "Invalid exponential parameter scaling factor (must be > 0)"
            );
        }
    }
}

// -------------------------------------------------------------------------------------------------
