use std::{
    fmt::{Debug, Display},
    ops::RangeInclusive,
    sync::Arc,
};

use four_cc::FourCC;

use super::{Parameter, ParameterScaling, ParameterType, ParameterValueUpdate};

// -------------------------------------------------------------------------------------------------

/// A continuous (float) parameter descriptor.
#[derive(Clone)]
pub struct FloatParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<f32>,
    default: f32,
    unit: &'static str,
    scaling: ParameterScaling,
    #[allow(clippy::type_complexity)]
    value_to_string: Option<Arc<dyn Fn(f32) -> String + Send + Sync>>,
    #[allow(clippy::type_complexity)]
    string_to_value: Option<Arc<dyn Fn(&str) -> Option<f32> + Send + Sync>>,
}

impl Debug for FloatParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FloatParameter")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("range", &self.range)
            .field("default", &self.default)
            .field("unit", &self.unit)
            .field("scaling", &self.scaling)
            .field("custom_display", &self.value_to_string.is_some())
            .finish()
    }
}

impl FloatParameter {
    /// Create a new float parameter descriptor.
    pub const fn new(
        id: FourCC,
        name: &'static str,
        range: RangeInclusive<f32>,
        default: f32,
    ) -> Self {
        assert!(
            default >= *range.start() && default <= *range.end(),
            "Invalid parameter default value"
        );
        Self {
            id,
            name,
            range,
            default,
            unit: "",
            scaling: ParameterScaling::Linear,
            value_to_string: None,
            string_to_value: None,
        }
    }

    /// Optional unit for string displays.
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Optional scaling of normalized values, e.g. for frequencies or times.
    pub const fn with_scaling(mut self, scaling: ParameterScaling) -> Self {
        scaling.validate();
        self.scaling = scaling;
        self
    }

    /// Optional custom conversion functions to convert a plain value to a string and string
    /// to a plain value. Returned strings should not contain the unit.
    pub fn with_display<
        ValueToString: Fn(f32) -> String + Send + Sync + 'static,
        StringToValue: Fn(&str) -> Option<f32> + Send + Sync + 'static,
    >(
        mut self,
        value_to_string: ValueToString,
        string_to_value: StringToValue,
    ) -> Self {
        self.value_to_string = Some(Arc::new(value_to_string));
        self.string_to_value = Some(Arc::new(string_to_value));
        self
    }

    /// The parameter's identifier.
    pub const fn id(&self) -> FourCC {
        self.id
    }

    /// The parameter's value range.
    pub fn range(&self) -> &RangeInclusive<f32> {
        &self.range
    }

    /// The parameter's plain default value.
    pub fn default_value(&self) -> f32 {
        self.default
    }

    /// The parameter's unit.
    pub fn unit(&self) -> &'static str {
        self.unit
    }

    /// The parameter's normalized value scaling.
    pub fn scaling(&self) -> &ParameterScaling {
        &self.scaling
    }

    /// Clamp the given plain value to the parameter's range. NaNs map to the default value.
    pub fn clamp_value(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(*self.range.start(), *self.range.end())
    }

    /// Normalize the given plain value to a 0.0-1.0 range, applying the inverse scaling.
    pub fn normalize_value(&self, value: f32) -> f32 {
        let (start, end) = (*self.range.start(), *self.range.end());
        let linear = ((self.clamp_value(value) - start) / (end - start)).clamp(0.0, 1.0);
        self.scaling.unscale(linear)
    }

    /// Denormalize a 0.0-1.0 ranged value to the corresponding plain value.
    pub fn denormalize_value(&self, normalized: f32) -> f32 {
        let (start, end) = (*self.range.start(), *self.range.end());
        start + self.scaling.scale(normalized.clamp(0.0, 1.0)) * (end - start)
    }

    /// Convert the given plain value to a string, using a custom conversion function if provided.
    pub fn value_to_string(&self, value: f32, include_unit: bool) -> String {
        match (&self.value_to_string, include_unit && !self.unit.is_empty()) {
            (Some(f), true) => format!("{} {}", f(value), self.unit),
            (Some(f), false) => f(value),
            (None, true) => format!("{:.2} {}", value, self.unit),
            (None, false) => format!("{:.2}", value),
        }
    }

    /// Convert the given string to a clamped plain value, using a custom conversion function if
    /// provided.
    pub fn string_to_value(&self, string: &str) -> Option<f32> {
        let string = string.trim();
        let value = match &self.string_to_value {
            Some(f) => f(string.trim_end_matches(self.unit).trim()),
            None => string.trim_end_matches(self.unit).trim().parse().ok(),
        }?;
        Some(self.clamp_value(value))
    }
}

impl Parameter for FloatParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Float {
            range: self.range.clone(),
            default: self.default,
            scaling: self.scaling,
        }
    }

    fn default_value(&self) -> f32 {
        self.normalize_value(self.default)
    }

    fn normalized_value_to_string(&self, normalized: f32, include_unit: bool) -> String {
        self.value_to_string(self.denormalize_value(normalized), include_unit)
    }

    fn string_to_normalized_value(&self, string: &str) -> Option<f32> {
        let value = self.string_to_value(string)?;
        Some(self.normalize_value(value))
    }
}

// -------------------------------------------------------------------------------------------------

/// Holds a float parameter value and its description.
#[derive(Debug, Clone)]
pub struct FloatParameterValue {
    description: FloatParameter,
    value: f32,
}

impl FloatParameterValue {
    /// Create a new parameter value, initialized to the description's default value.
    pub fn from_description(description: FloatParameter) -> Self {
        let value = description.default_value();
        Self { value, description }
    }

    /// Access the parameter value's description.
    pub fn description(&self) -> &FloatParameter {
        &self.description
    }

    /// Access to the current value.
    #[inline(always)]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Set a new value, clamping the given value into the parameter's value bounds if necessary.
    pub fn set_value_clamped(&mut self, value: f32) {
        self.value = self.description.clamp_value(value);
    }

    /// Applies a parameter update.
    pub fn apply_update(&mut self, update: &ParameterValueUpdate) {
        match *update {
            ParameterValueUpdate::Raw(value) => self.set_value_clamped(value),
            ParameterValueUpdate::Normalized(normalized) => {
                self.value = self.description.denormalize_value(normalized);
            }
        }
    }
}

impl Display for FloatParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let include_unit = true;
        f.write_str(&self.description.value_to_string(self.value, include_unit))
    }
}

// -------------------------------------------------------------------------------------------------
