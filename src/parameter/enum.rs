use four_cc::FourCC;
use strum::IntoEnumIterator;

use super::{Parameter, ParameterType};

// -------------------------------------------------------------------------------------------------

/// An enum parameter descriptor. Plain values are the variant's index.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumParameter {
    id: FourCC,
    name: &'static str,
    values: Vec<String>,
    default_index: usize,
}

impl EnumParameter {
    pub fn new<E: IntoEnumIterator + ToString + PartialEq>(
        id: FourCC,
        name: &'static str,
        default: E,
    ) -> Self {
        let values = E::iter().map(|v| v.to_string()).collect::<Vec<_>>();
        let default_index = E::iter().position(|v| v == default).unwrap_or(0);
        Self {
            id,
            name,
            values,
            default_index,
        }
    }

    pub const fn id(&self) -> FourCC {
        self.id
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn default_index(&self) -> usize {
        self.default_index
    }

    fn index_from_normalized(&self, normalized: f32) -> usize {
        let last = self.values.len().saturating_sub(1);
        (normalized.clamp(0.0, 1.0) * last as f32).round() as usize
    }
}

impl Parameter for EnumParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Enum {
            values: self.values.clone(),
            default_index: self.default_index,
        }
    }

    fn normalized_value_to_string(&self, normalized: f32, _include_unit: bool) -> String {
        let index = self.index_from_normalized(normalized);
        self.values.get(index).cloned().unwrap_or_default()
    }

    fn string_to_normalized_value(&self, string: &str) -> Option<f32> {
        let string = string.trim();
        let index = self
            .values
            .iter()
            .position(|v| v.eq_ignore_ascii_case(string))?;
        let last = self.values.len().saturating_sub(1).max(1);
        Some(index as f32 / last as f32)
    }
}

// -------------------------------------------------------------------------------------------------
