#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod effect;
mod engine;
mod error;
mod parameter;
mod sampler;

// public, flat re-exports
pub use error::Error;

pub use engine::{layout, Engine};

pub use parameter::{
    BooleanParameter, ClonableParameter, EnumParameter, FloatParameter, Parameter,
    ParameterScaling, ParameterStore, ParameterType, ParameterValueUpdate,
};

pub use sampler::{
    allocator::PlaybackMode,
    slot::{SampleBank, SampleSlot, SLOT_COUNT, THUMBNAIL_POINTS},
    NoteEvent, NoteMessage, VOICE_COUNT,
};

pub use effect::Effect;

// public mods
pub mod utils;

pub mod effects {
    //! The analog modeled effects of the engine's processing chain.

    pub use super::effect::{
        bbd_chorus::BbdChorusEffect, bbd_delay::BbdDelayEffect,
        spectral_filter::SpectralFilterEffect, tape_saturation::TapeSaturationEffect,
    };
}
