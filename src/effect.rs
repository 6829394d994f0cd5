use four_cc::FourCC;

use crate::{parameter::ParameterValueUpdate, ClonableParameter, Error};

// -------------------------------------------------------------------------------------------------

pub mod bbd_chorus;
pub mod bbd_delay;
pub mod spectral_filter;
pub mod tape_saturation;

// -------------------------------------------------------------------------------------------------

/// Effects manipulate interleaved audio samples in `f32` format in-place in the audio real-time
/// thread.
///
/// Parameters either get set directly via the effect's typed setters before or between
/// processing, or in audio time via [`Effect::process_parameter_update`]. The
/// [`Engine`](crate::Engine) feeds the latter from its [`ParameterStore`](crate::ParameterStore)
/// once per block, before calling `process`.
///
/// NB: all `process_XXX` functions are called in realtime audio threads, so they must not
/// block or allocate! All other functions are called in the main thread to initialize the effect.
pub trait Effect: Send + Sync + 'static {
    /// A unique, static name for the effect, used for logging and in UIs.
    fn name(&self) -> &'static str;

    /// Returns a list of parameter descriptors for this effect.
    ///
    /// May only be called on non-real-time threads.
    fn parameters(&self) -> Vec<&dyn ClonableParameter>;

    /// Initializes the effect with the audio output's properties.
    ///
    /// Runs on a non-real-time thread, so it's safe to allocate buffers here. Resets all state.
    fn initialize(
        &mut self,
        sample_rate: u32,
        channel_count: usize,
        max_frames: usize,
    ) -> Result<(), Error>;

    /// Clears all retained signal state (delay lines, filter states, LFO phases) without
    /// reallocating. Parameters are kept.
    fn reset(&mut self);

    /// Processes an interleaved audio buffer in-place, applying the effect.
    fn process(&mut self, output: &mut [f32]);

    /// Returns the number of audible sample frames this effect will produce after it received
    /// silence, when known.
    fn process_tail(&self) -> Option<usize> {
        None
    }

    /// Handles a parameter update in the real-time thread. The `value` can be a raw or
    /// normalized value. Unknown ids are rejected.
    fn process_parameter_update(
        &mut self,
        id: FourCC,
        value: &ParameterValueUpdate,
    ) -> Result<(), Error>;
}
