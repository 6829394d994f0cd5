use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use four_cc::FourCC;

use crate::{
    effect::{
        bbd_chorus::BbdChorusEffect, bbd_delay::BbdDelayEffect,
        spectral_filter::SpectralFilterEffect, tape_saturation::TapeSaturationEffect, Effect,
    },
    parameter::{BooleanParameter, Parameter, ParameterValueUpdate},
    sampler::{slot::SampleBank, NoteEvent, Sampler},
    utils::{db_to_linear, sanitize_and_soft_clip},
    Error, ParameterStore,
};

// -------------------------------------------------------------------------------------------------

pub mod layout;

use layout::ParameterIndices;

// -------------------------------------------------------------------------------------------------

/// Store index and id of an effect parameter, with the last value sent to the effect.
struct ParameterBinding {
    index: usize,
    id: FourCC,
    value: Option<f32>,
}

/// An effect in the engine's fixed processing chain.
struct EffectSlot {
    effect: Box<dyn Effect>,
    bypass: usize,
    bindings: Vec<ParameterBinding>,
}

impl EffectSlot {
    /// Send changed store values to the effect.
    fn update_parameters(&mut self, store: &ParameterStore) {
        for binding in &mut self.bindings {
            let value = store.value_at(binding.index);
            if binding.value == Some(value) {
                continue;
            }
            binding.value = Some(value);
            if let Err(err) = self
                .effect
                .process_parameter_update(binding.id, &ParameterValueUpdate::Raw(value))
            {
                log::warn!("Failed to update parameter: {err}");
            }
        }
    }

    /// Force sending all values with the next update.
    fn invalidate_parameters(&mut self) {
        for binding in &mut self.bindings {
            binding.value = None;
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// The real-time render entry point: plays the sample slots of a [`SampleBank`] on a polyphonic
/// [`Sampler`] and runs the result through a fixed effect chain and a master stage.
///
/// Signal flow per block:
/// voices → delay → chorus → tape saturation → spectral filter → master volume → stereo width →
/// soft clip. Each effect can be bypassed, which skips its processing and freezes its state.
///
/// All parameters live in a [`ParameterStore`], see [`Self::parameters`]. Clones of the store can
/// be used to change values from any thread. The engine reads them once per block.
///
/// Note events are either passed directly to [`Self::process`] with a frame offset, or pushed
/// into the lock-free [`Self::note_event_queue`] from other threads. Queued events get applied
/// at the start of the next block.
pub struct Engine {
    store: ParameterStore,
    indices: ParameterIndices,
    sampler: Sampler,
    effects: Vec<EffectSlot>,
    event_queue: Arc<ArrayQueue<NoteEvent>>,
    sample_rate: u32,
    max_frames: usize,
}

impl Engine {
    /// Max number of pending events in the note event queue.
    pub const EVENT_QUEUE_SIZE: usize = 1024;

    const DEFAULT_SAMPLE_RATE: u32 = 44100;
    const DEFAULT_MAX_FRAMES: usize = 512;
    const CHANNEL_COUNT: usize = 2;

    /// Create a new engine which plays the slots of the given sample bank.
    ///
    /// The engine uses a default sample rate until [`Self::initialize`] gets called.
    pub fn new(bank: &SampleBank) -> Result<Self, Error> {
        let chain: [(Box<dyn Effect>, BooleanParameter); 4] = [
            (Box::new(BbdDelayEffect::new()), layout::DELAY_BYPASS),
            (Box::new(BbdChorusEffect::new()), layout::CHORUS_BYPASS),
            (Box::new(TapeSaturationEffect::new()), layout::TAPE_BYPASS),
            (
                Box::new(SpectralFilterEffect::new()),
                layout::SPECTRAL_BYPASS,
            ),
        ];

        let mut descriptions = layout::global_parameters();
        descriptions.extend(layout::slot_parameters());
        for (effect, bypass) in &chain {
            descriptions.push(Box::new(bypass.clone()));
            descriptions.extend(
                effect
                    .parameters()
                    .into_iter()
                    .map(|parameter| parameter.dyn_clone()),
            );
        }
        let store = ParameterStore::new(descriptions)?;
        let indices = ParameterIndices::resolve(&store)?;

        let index_of = |id: FourCC| {
            store
                .index_of(id)
                .ok_or_else(|| Error::ParameterError(format!("Missing parameter '{id}'")))
        };
        let mut effects = Vec::with_capacity(chain.len());
        for (effect, bypass) in chain {
            let bindings = effect
                .parameters()
                .into_iter()
                .map(|parameter| {
                    Ok(ParameterBinding {
                        index: index_of(parameter.id())?,
                        id: parameter.id(),
                        value: None,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;
            effects.push(EffectSlot {
                effect,
                bypass: index_of(bypass.id())?,
                bindings,
            });
        }

        let sampler = Sampler::new(bank.shared_slots(), Self::DEFAULT_SAMPLE_RATE);
        let event_queue = Arc::new(ArrayQueue::new(Self::EVENT_QUEUE_SIZE));

        let mut engine = Self {
            store,
            indices,
            sampler,
            effects,
            event_queue,
            sample_rate: 0,
            max_frames: 0,
        };
        engine.initialize(Self::DEFAULT_SAMPLE_RATE, Self::DEFAULT_MAX_FRAMES)?;
        Ok(engine)
    }

    /// A handle to the engine's parameter values. Values set in the returned store get applied
    /// with the next processed block.
    pub fn parameters(&self) -> ParameterStore {
        self.store.clone()
    }

    /// Output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Max number of frames a single [`Self::process`] call is prepared for.
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Prepare for playback with the given output sample rate and max block size.
    ///
    /// Allocates all buffers, so this must not be called in real-time threads. Stops all voices
    /// and resets all effect states.
    pub fn initialize(&mut self, sample_rate: u32, max_frames: usize) -> Result<(), Error> {
        if sample_rate == 0 {
            return Err(Error::InitializationError(
                "Invalid sample rate: must be > 0".to_owned(),
            ));
        }
        if max_frames == 0 {
            return Err(Error::InitializationError(
                "Invalid block size: must be > 0".to_owned(),
            ));
        }
        for slot in &mut self.effects {
            slot.effect
                .initialize(sample_rate, Self::CHANNEL_COUNT, max_frames)?;
            slot.invalidate_parameters();
        }
        self.sampler.set_sample_rate(sample_rate);
        self.sampler.all_notes_off(false);
        self.sample_rate = sample_rate;
        self.max_frames = max_frames;
        log::info!(
            "Initialized engine with sample rate {sample_rate} Hz and max block size {max_frames}"
        );
        Ok(())
    }

    /// Stop all voices immediately and clear all effect states. Parameters are kept.
    pub fn reset(&mut self) {
        self.sampler.all_notes_off(false);
        for slot in &mut self.effects {
            slot.effect.reset();
        }
    }

    /// A lock-free queue into which other threads can push note events. Frame offsets of queued
    /// events are ignored: they all apply at the start of the next processed block.
    pub fn note_event_queue(&self) -> Arc<ArrayQueue<NoteEvent>> {
        Arc::clone(&self.event_queue)
    }

    /// Push a note event into the note event queue. Returns false when the queue is full and the
    /// event got dropped.
    pub fn queue_note_event(&self, event: NoteEvent) -> bool {
        if self.event_queue.push(event).is_err() {
            log::warn!("Note event queue is full. Dropping event...");
            false
        } else {
            true
        }
    }

    /// Number of voices which are currently playing.
    pub fn active_voice_count(&self) -> usize {
        self.sampler.active_voice_count()
    }

    /// Number of frames the engine may still produce after all notes got released and stopped.
    pub fn tail_frames(&self) -> usize {
        self.effects
            .iter()
            .filter(|slot| !self.is_bypassed(slot))
            .filter_map(|slot| slot.effect.process_tail())
            .fold(self.sample_rate as usize, usize::max)
    }

    /// Render a block of interleaved stereo audio into `output`, overwriting its content.
    ///
    /// `events` must be sorted by frame offset and get applied sample accurately. Real-time safe:
    /// never blocks or allocates.
    pub fn process(&mut self, output: &mut [f32], events: &[NoteEvent]) {
        Self::assert_no_alloc(|| {
            debug_assert!(
                output.len() % Self::CHANNEL_COUNT == 0,
                "Expecting an interleaved stereo buffer"
            );
            debug_assert!(
                output.len() / Self::CHANNEL_COUNT <= self.max_frames,
                "Block size exceeds the initialized max frames"
            );

            let parameters = self.indices.sampler_parameters(&self.store);
            while let Some(event) = self.event_queue.pop() {
                self.sampler.handle_message(&event.message, &parameters);
            }
            self.sampler.process(output, events, &parameters);

            for slot in &mut self.effects {
                if self.store.value_at(slot.bypass) > 0.5 {
                    continue;
                }
                slot.update_parameters(&self.store);
                slot.effect.process(output);
            }

            let (volume_db, width) = self.indices.master(&self.store);
            Self::process_master(output, db_to_linear(volume_db), width);
        })
    }

    fn is_bypassed(&self, slot: &EffectSlot) -> bool {
        self.store.value_at(slot.bypass) > 0.5
    }

    /// Apply master gain, mid/side stereo width, then sanitize and soft clip.
    fn process_master(output: &mut [f32], gain: f32, width: f32) {
        let apply_width = width != 1.0;
        for frame in output.chunks_exact_mut(Self::CHANNEL_COUNT) {
            let mut left = frame[0] * gain;
            let mut right = frame[1] * gain;
            if apply_width {
                let mid = (left + right) * 0.5;
                let side = (left - right) * 0.5 * width;
                left = mid + side;
                right = mid - side;
            }
            frame[0] = sanitize_and_soft_clip(left);
            frame[1] = sanitize_and_soft_clip(right);
        }
    }

    fn assert_no_alloc<T, F: FnOnce() -> T>(func: F) -> T {
        #[cfg(feature = "assert-allocs")]
        return assert_no_alloc::assert_no_alloc::<T, F>(func);

        #[cfg(not(feature = "assert-allocs"))]
        return func();
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        effect::{bbd_delay::BbdDelayEffect, tape_saturation::TapeSaturationEffect},
        engine::layout::{SlotParameter, DELAY_BYPASS, MASTER_VOLUME, STEREO_WIDTH, TAPE_BYPASS},
        sampler::slot::SampleSlot,
    };

    const SAMPLE_RATE: u32 = 44100;
    const BLOCK_SIZE: usize = 256;

    fn sine(frequency: f32, amplitude: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32)
                        .sin()
            })
            .collect()
    }

    fn bank_with_sine() -> SampleBank {
        let mut bank = SampleBank::new();
        let slot = SampleSlot::from_planar(vec![sine(220.0, 0.5, SAMPLE_RATE as usize)], SAMPLE_RATE)
            .expect("valid sample");
        bank.load(0, slot).expect("valid slot index");
        bank
    }

    fn new_engine(bank: &SampleBank) -> Engine {
        let mut engine = Engine::new(bank).expect("valid engine layout");
        engine
            .initialize(SAMPLE_RATE, BLOCK_SIZE)
            .expect("valid engine setup");
        engine
    }

    fn render(engine: &mut Engine, events: &[NoteEvent]) -> Vec<f32> {
        let mut output = vec![0.0; BLOCK_SIZE * 2];
        engine.process(&mut output, events);
        output
    }

    fn peak(buffer: &[f32]) -> f32 {
        buffer.iter().fold(0.0, |max, value| max.max(value.abs()))
    }

    #[test]
    fn initialize() {
        let bank = SampleBank::new();
        let mut engine = Engine::new(&bank).unwrap();
        assert!(engine.initialize(0, BLOCK_SIZE).is_err());
        assert!(engine.initialize(SAMPLE_RATE, 0).is_err());
        assert!(engine.initialize(48000, 128).is_ok());
        assert_eq!(engine.sample_rate(), 48000);
        assert_eq!(engine.max_frames(), 128);
        assert_eq!(engine.tail_frames(), 48000);
    }

    #[test]
    fn silent_without_voices() {
        let bank = bank_with_sine();
        let mut engine = new_engine(&bank);
        let output = render(&mut engine, &[]);
        assert!(output.iter().all(|s| *s == 0.0));

        // no loaded slots: notes are ignored
        let empty_bank = SampleBank::new();
        let mut engine = new_engine(&empty_bank);
        let output = render(&mut engine, &[NoteEvent::note_on(0, 60, 1.0)]);
        assert!(output.iter().all(|s| *s == 0.0));
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn renders_notes() {
        let bank = bank_with_sine();
        let mut engine = new_engine(&bank);
        let output = render(&mut engine, &[NoteEvent::note_on(0, 60, 1.0)]);
        assert_eq!(engine.active_voice_count(), 1);
        assert!(peak(&output) > 0.0);
        // mono slots play on both channels
        for frame in output.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn queued_events() {
        let bank = bank_with_sine();
        let mut engine = new_engine(&bank);
        assert!(engine.queue_note_event(NoteEvent::note_on(0, 60, 1.0)));
        let queue = engine.note_event_queue();
        assert_eq!(queue.len(), 1);
        render(&mut engine, &[]);
        assert!(queue.is_empty());
        assert_eq!(engine.active_voice_count(), 1);

        for _ in 0..Engine::EVENT_QUEUE_SIZE {
            assert!(engine.queue_note_event(NoteEvent::note_off(0, 60, true)));
        }
        assert!(!engine.queue_note_event(NoteEvent::note_off(0, 60, true)));
    }

    #[test]
    fn bypass_skips_effects() {
        let bank = bank_with_sine();
        let events = [NoteEvent::note_on(0, 60, 1.0)];

        let mut dry_engine = new_engine(&bank);
        let mut tape_engine = new_engine(&bank);
        let parameters = tape_engine.parameters();
        parameters.set_value(TAPE_BYPASS.id(), 0.0).unwrap();
        parameters
            .set_value(TapeSaturationEffect::DRIVE_ID, 1.0)
            .unwrap();
        parameters.set_value(TapeSaturationEffect::MIX_ID, 1.0).unwrap();
        assert_ne!(
            render(&mut dry_engine, &events),
            render(&mut tape_engine, &events)
        );

        parameters.set_value(TAPE_BYPASS.id(), 1.0).unwrap();
        assert_eq!(
            render(&mut dry_engine, &[]),
            render(&mut tape_engine, &[])
        );
    }

    #[test]
    fn unknown_parameters_are_rejected() {
        let bank = SampleBank::new();
        let engine = new_engine(&bank);
        let parameters = engine.parameters();
        assert!(parameters.set_value(FourCC(*b"????"), 1.0).is_err());
        assert!(parameters.value(FourCC(*b"????")).is_err());
        assert!(parameters
            .set_value(SlotParameter::Volume.id(4), -6.0)
            .is_ok());
    }

    #[test]
    fn master_gain_and_width() {
        let bank = bank_with_sine();
        let events = [NoteEvent::note_on(0, 60, 1.0)];

        let mut reference = new_engine(&bank);
        let reference_output = render(&mut reference, &events);

        let mut engine = new_engine(&bank);
        let parameters = engine.parameters();
        parameters.set_value(MASTER_VOLUME.id(), -60.0).unwrap();
        let quiet = render(&mut engine, &events);
        assert!(peak(&quiet) < peak(&reference_output) * 0.01);

        // a mono signal has no side content: width 0 keeps it as is
        let mut engine = new_engine(&bank);
        engine
            .parameters()
            .set_value(STEREO_WIDTH.id(), 0.0)
            .unwrap();
        let narrow = render(&mut engine, &events);
        for (a, b) in narrow.iter().zip(&reference_output) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn output_stays_bounded() {
        let mut bank = SampleBank::new();
        for index in 0..5 {
            let slot = SampleSlot::from_planar(vec![vec![1.0; 4096], vec![-1.0; 4096]], SAMPLE_RATE)
                .unwrap();
            bank.load(index, slot).unwrap();
        }
        let mut engine = new_engine(&bank);
        let parameters = engine.parameters();
        parameters.set_value(MASTER_VOLUME.id(), 12.0).unwrap();
        for slot in 0..5 {
            parameters
                .set_value(SlotParameter::Volume.id(slot), 12.0)
                .unwrap();
            parameters
                .set_value(SlotParameter::Attack.id(slot), 0.0)
                .unwrap();
        }
        let events = (0..8)
            .map(|note| NoteEvent::note_on(0, 60 + note, 1.0))
            .collect::<Vec<_>>();
        for _ in 0..4 {
            let output = render(&mut engine, &events);
            assert!(output.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        }
    }

    #[test]
    fn delay_feedback_stays_bounded() {
        let mut bank = SampleBank::new();
        let square = (0..4410)
            .map(|frame| if (frame / 50) % 2 == 0 { 1.0 } else { -1.0 })
            .collect::<Vec<_>>();
        bank.load(0, SampleSlot::from_planar(vec![square], SAMPLE_RATE).unwrap())
            .unwrap();
        let mut engine = new_engine(&bank);
        let parameters = engine.parameters();
        parameters.set_value(DELAY_BYPASS.id(), 0.0).unwrap();
        parameters
            .set_value(BbdDelayEffect::FEEDBACK_ID, 0.99)
            .unwrap();
        parameters.set_value(BbdDelayEffect::MIX_ID, 1.0).unwrap();
        parameters.set_value(MASTER_VOLUME.id(), 12.0).unwrap();
        parameters
            .set_value(SlotParameter::Volume.id(0), 12.0)
            .unwrap();
        parameters.set_value(SlotParameter::Loop.id(0), 1.0).unwrap();
        parameters
            .set_value(SlotParameter::Sustain.id(0), 0.0)
            .unwrap();

        let chord = [48, 55, 60, 64, 67].map(|note| NoteEvent::note_on(0, note, 1.0));
        let block_count = 4 * SAMPLE_RATE as usize / BLOCK_SIZE;
        let mut peak_output = 0.0f32;
        for block in 0..block_count {
            let events: &[NoteEvent] = if block == 0 { &chord } else { &[] };
            let output = render(&mut engine, events);
            assert!(output.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
            peak_output = peak_output.max(peak(&output));
        }
        assert_eq!(engine.active_voice_count(), chord.len());
        assert!(peak_output > 0.5);
        assert!(engine.tail_frames() > SAMPLE_RATE as usize);
    }

    #[test]
    fn sample_swap_keeps_playing_voices() {
        let mut bank = bank_with_sine();
        let mut engine = new_engine(&bank);
        let first = render(&mut engine, &[NoteEvent::note_on(0, 60, 1.0)]);
        assert!(peak(&first) > 0.0);

        let silence = SampleSlot::from_planar(vec![vec![0.0; 4096]], SAMPLE_RATE).unwrap();
        bank.load(0, silence).unwrap();
        let second = render(&mut engine, &[]);
        assert_eq!(engine.active_voice_count(), 1);
        assert!(peak(&second) > 0.01);

        // new notes pick up the new sample
        engine.reset();
        let third = render(&mut engine, &[NoteEvent::note_on(0, 60, 1.0)]);
        assert_eq!(engine.active_voice_count(), 1);
        assert_eq!(peak(&third), 0.0);

        drop(engine);
        bank.collect_garbage();
    }
}
