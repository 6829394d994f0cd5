use std::{error, fmt};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by polyslot.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// A parameter id is unknown or a parameter value can not be applied.
    ParameterError(String),
    /// Sample data passed to a slot is malformed.
    SampleSlotError(String),
    /// A sample slot index is out of range.
    SlotIndexError(usize),
    /// An engine or effect failed to prepare for playback.
    InitializationError(String),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::SampleSlotError(str) => write!(f, "Invalid sample data: {str}"),
            Self::SlotIndexError(index) => write!(f, "Sample slot with index {index} not found"),
            Self::InitializationError(str) => write!(f, "Failed to initialize: {str}"),
        }
    }
}
