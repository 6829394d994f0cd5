//! Filters used by the sampler voices and effects.

pub mod one_pole;
pub mod svf;
