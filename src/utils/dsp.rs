//! Common, shared DSP tools for the sampler voices and effects.

pub mod companding;
pub mod delay;
pub mod filters;
pub mod lfo;
