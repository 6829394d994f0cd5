use std::fmt::Debug;

use four_cc::FourCC;

use super::{Parameter, ParameterType};

// -------------------------------------------------------------------------------------------------

/// A boolean parameter descriptor.
#[derive(Debug, Clone)]
pub struct BooleanParameter {
    id: FourCC,
    name: &'static str,
    default: bool,
}

impl BooleanParameter {
    /// Create a new boolean parameter descriptor.
    pub const fn new(id: FourCC, name: &'static str, default: bool) -> Self {
        Self { id, name, default }
    }

    /// The parameter's identifier.
    pub const fn id(&self) -> FourCC {
        self.id
    }

    /// The parameter's default value.
    pub const fn default_value(&self) -> bool {
        self.default
    }

    /// Convert the given plain value to a display string.
    pub fn value_to_string(&self, value: bool) -> String {
        if value {
            "ON".to_string()
        } else {
            "OFF".to_string()
        }
    }

    /// Convert the given string to a plain value.
    pub fn string_to_value(&self, string: &str) -> Option<bool> {
        let string = string.trim();
        if string.eq_ignore_ascii_case("ON") {
            Some(true)
        } else if string.eq_ignore_ascii_case("OFF") {
            Some(false)
        } else {
            string.parse::<bool>().ok()
        }
    }
}

impl Parameter for BooleanParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Boolean {
            default: self.default,
        }
    }

    fn normalized_value_to_string(&self, normalized: f32, _include_unit: bool) -> String {
        self.value_to_string(normalized >= 0.5)
    }

    fn string_to_normalized_value(&self, string: &str) -> Option<f32> {
        let value = self.string_to_value(string)?;
        Some(if value { 1.0 } else { 0.0 })
    }
}

// -------------------------------------------------------------------------------------------------
