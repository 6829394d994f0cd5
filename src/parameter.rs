//! Parameter descriptors, value wrappers and the shared parameter store.

use std::{fmt::Debug, ops::RangeInclusive};

use four_cc::FourCC;

// -------------------------------------------------------------------------------------------------

/// Describes the type of a [`Parameter`] to e.g. select a proper visual representation in a UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterType {
    /// A continuous floating-point value.
    Float {
        range: RangeInclusive<f32>,
        default: f32,
        scaling: ParameterScaling,
    },
    /// A choice from a list of strings (an enum). Plain values are variant indices.
    Enum {
        values: Vec<String>,
        default_index: usize,
    },
    /// A boolean toggle. Plain values are `0.0` or `1.0`.
    Boolean { default: bool },
}

impl ParameterType {
    /// The plain value range of the parameter, expressed as float.
    pub fn plain_range(&self) -> RangeInclusive<f32> {
        match self {
            Self::Float { range, .. } => range.clone(),
            Self::Enum { values, .. } => 0.0..=(values.len().max(1) - 1) as f32,
            Self::Boolean { .. } => 0.0..=1.0,
        }
    }

    /// The plain default value of the parameter, expressed as float.
    pub fn plain_default(&self) -> f32 {
        match self {
            Self::Float { default, .. } => *default,
            Self::Enum { default_index, .. } => *default_index as f32,
            Self::Boolean { default } => {
                if *default {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Convert a plain value to a normalized, scaled `0.0..=1.0` value.
    pub fn normalize(&self, plain: f32) -> f32 {
        let range = self.plain_range();
        let (start, end) = (*range.start(), *range.end());
        if end <= start {
            return 0.0;
        }
        let linear = ((plain - start) / (end - start)).clamp(0.0, 1.0);
        match self {
            Self::Float { scaling, .. } => scaling.unscale(linear),
            _ => linear,
        }
    }

    /// Convert a normalized `0.0..=1.0` value to a plain value, quantizing discrete types.
    pub fn denormalize(&self, normalized: f32) -> f32 {
        let normalized = normalized.clamp(0.0, 1.0);
        let range = self.plain_range();
        let (start, end) = (*range.start(), *range.end());
        match self {
            Self::Float { scaling, .. } => start + scaling.scale(normalized) * (end - start),
            Self::Enum { .. } | Self::Boolean { .. } => (start + normalized * (end - start)).round(),
        }
    }

    /// Clamp and, for discrete types, quantize the given plain value.
    pub fn clamp(&self, plain: f32) -> f32 {
        let range = self.plain_range();
        let plain = if plain.is_finite() {
            plain
        } else {
            self.plain_default()
        };
        let clamped = plain.clamp(*range.start(), *range.end());
        match self {
            Self::Float { .. } => clamped,
            Self::Enum { .. } | Self::Boolean { .. } => clamped.round(),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Describes a single parameter of the engine or an [`Effect`](crate::Effect) for use in UIs,
/// automation or the [`ParameterStore`].
pub trait Parameter: Debug + Send + Sync {
    /// The unique id of the parameter.
    fn id(&self) -> FourCC;

    /// The name of the parameter.
    fn name(&self) -> &'static str;

    /// The parameter type.
    fn parameter_type(&self) -> ParameterType;

    /// Default value of parameter, expressed as normalized floating point value in range \[0,1\].
    fn default_value(&self) -> f32 {
        let parameter_type = self.parameter_type();
        parameter_type.normalize(parameter_type.plain_default())
    }

    /// Convert the given normalized floating point value to a string value.
    fn normalized_value_to_string(&self, normalized: f32, include_unit: bool) -> String;

    /// Convert the given string value to a normalized floating point value.
    /// Returns `None` when conversion failed, else a valid normalized value.
    fn string_to_normalized_value(&self, string: &str) -> Option<f32>;
}

/// Allows creating `dyn Parameter` clones.
pub trait ClonableParameter: Parameter {
    /// Create a dyn Parameter clone, wrapped into a box.
    fn dyn_clone(&self) -> Box<dyn Parameter>;
}

impl<P> ClonableParameter for P
where
    P: Parameter + Clone + 'static,
{
    fn dyn_clone(&self) -> Box<dyn Parameter> {
        Box::new(Self::clone(self))
    }
}

// -------------------------------------------------------------------------------------------------

/// An update for a [`Parameter`]'s value, consumed by [`Effect`](crate::Effect)s in audio time.
///
/// Plain values of enum and boolean parameters are variant indices and `0.0`/`1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValueUpdate {
    /// A plain value in the parameter's range.
    Raw(f32),
    /// A float value in range `0.0..=1.0`.
    Normalized(f32),
}

// -------------------------------------------------------------------------------------------------

mod float;
pub use float::{FloatParameter, FloatParameterValue};

mod r#enum;
pub use r#enum::EnumParameter;

mod boolean;
pub use boolean::BooleanParameter;

mod scaling;
pub use scaling::ParameterScaling;

mod store;
pub use store::ParameterStore;
