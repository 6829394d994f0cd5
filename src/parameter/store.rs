use std::sync::Arc;

use four_cc::FourCC;
use fundsp::shared::Shared;

use super::{Parameter, ParameterType};
use crate::Error;

// -------------------------------------------------------------------------------------------------

struct StoredParameter {
    description: Box<dyn Parameter>,
    parameter_type: ParameterType,
    value: Shared,
}

// -------------------------------------------------------------------------------------------------

/// Lock-free store of plain parameter values, shared between control threads and the audio thread.
///
/// Each parameter's value lives in a fundsp [`Shared`] atomic float. Clones of the store share the
/// same values, so a UI or host thread can set values while the audio thread reads them without
/// blocking. Values are clamped to the parameter's range when set.
///
/// Lookups by id are linear and meant for control threads. The audio thread resolves ids to
/// indices once and then reads via index.
#[derive(Clone)]
pub struct ParameterStore {
    parameters: Arc<Vec<StoredParameter>>,
}

impl ParameterStore {
    /// Create a new store from the given descriptions, initialized to their default values.
    /// Parameter ids must be unique.
    pub fn new(descriptions: Vec<Box<dyn Parameter>>) -> Result<Self, Error> {
        let mut parameters = Vec::with_capacity(descriptions.len());
        for description in descriptions {
            let id = description.id();
            if parameters
                .iter()
                .any(|p: &StoredParameter| p.description.id() == id)
            {
                return Err(Error::ParameterError(format!(
                    "Duplicate parameter id '{id}'"
                )));
            }
            let parameter_type = description.parameter_type();
            let value = Shared::new(parameter_type.plain_default());
            parameters.push(StoredParameter {
                description,
                parameter_type,
                value,
            });
        }
        Ok(Self {
            parameters: Arc::new(parameters),
        })
    }

    /// Number of parameters in the store.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// True when the store holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// All parameter descriptions in store order.
    pub fn descriptions(&self) -> impl Iterator<Item = &dyn Parameter> {
        self.parameters.iter().map(|p| p.description.as_ref())
    }

    /// Resolve a parameter id to its index in the store.
    pub fn index_of(&self, id: FourCC) -> Option<usize> {
        self.parameters.iter().position(|p| p.description.id() == id)
    }

    /// Current plain value of the given parameter.
    pub fn value(&self, id: FourCC) -> Result<f32, Error> {
        Ok(self.parameter(id)?.value.value())
    }

    /// Current value of the given parameter, normalized to `0.0..=1.0`.
    pub fn normalized_value(&self, id: FourCC) -> Result<f32, Error> {
        let parameter = self.parameter(id)?;
        Ok(parameter.parameter_type.normalize(parameter.value.value()))
    }

    /// Set a new plain value. Values out of range are clamped, discrete values quantized.
    pub fn set_value(&self, id: FourCC, value: f32) -> Result<(), Error> {
        let parameter = self.parameter(id)?;
        let clamped = parameter.parameter_type.clamp(value);
        if clamped != value {
            log::warn!(
                "Value {value} of parameter '{}' got clamped to {clamped}",
                parameter.description.name()
            );
        }
        parameter.value.set_value(clamped);
        Ok(())
    }

    /// Set a new normalized `0.0..=1.0` value.
    pub fn set_normalized_value(&self, id: FourCC, normalized: f32) -> Result<(), Error> {
        let parameter = self.parameter(id)?;
        if !(0.0..=1.0).contains(&normalized) {
            log::warn!(
                "Normalized value {normalized} of parameter '{}' is out of range",
                parameter.description.name()
            );
        }
        let value = parameter.parameter_type.denormalize(normalized);
        parameter.value.set_value(value);
        Ok(())
    }

    /// Reset all parameters to their default values.
    pub fn reset_to_defaults(&self) {
        for parameter in self.parameters.iter() {
            parameter
                .value
                .set_value(parameter.parameter_type.plain_default());
        }
    }

    /// Plain value of the parameter at the given store index. Allocation and lock free.
    #[inline]
    pub(crate) fn value_at(&self, index: usize) -> f32 {
        debug_assert!(index < self.parameters.len(), "Invalid parameter index");
        self.parameters
            .get(index)
            .map(|p| p.value.value())
            .unwrap_or(0.0)
    }

    fn parameter(&self, id: FourCC) -> Result<&StoredParameter, Error> {
        self.parameters
            .iter()
            .find(|p| p.description.id() == id)
            .ok_or_else(|| Error::ParameterError(format!("Unknown parameter id '{id}'")))
    }
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.parameters
                    .iter()
                    .map(|p| (p.description.id(), p.value.value())),
            )
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------
