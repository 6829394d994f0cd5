use basedrop::Shared;

use crate::utils::{
    db_to_linear,
    dsp::{
        filters::svf::{SvfCoefficients, SvfFilter, SvfFilterType},
        lfo::{Lfo, LfoWaveform},
    },
    sanitize, semitones_to_ratio,
};

use super::{
    allocator::SlotAllocation,
    envelope::{EnvelopeStage, EnvelopeTimes, SlotEnvelope},
    slot::{SampleSlot, SLOT_COUNT},
};

// -------------------------------------------------------------------------------------------------

/// Note which plays at the sample's original speed.
pub const ROOT_NOTE: i32 = 60;

/// Filter and LFO settings get applied once every `CONTROL_RATE_DIVIDER` samples.
const CONTROL_RATE_DIVIDER: usize = 32;

/// Shortest in/out range that gets played, when the sample is long enough.
const MIN_PLAYABLE_FRAMES: usize = 64;

const MIN_MODULATED_CUTOFF: f32 = 20.0;
const MAX_MODULATED_CUTOFF: f32 = 20000.0;

// -------------------------------------------------------------------------------------------------

/// Playback settings of a single sample slot, as read from the parameter store once per block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotParameters {
    pub volume_db: f32,
    pub pitch: f32,
    pub attack_ms: f32,
    pub decay_ms: f32,
    pub sustain_db: f32,
    pub release_ms: f32,
    pub in_point: f32,
    pub out_point: f32,
    pub looping: bool,
    pub filter_type: SvfFilterType,
    pub cutoff: f32,
    pub resonance: f32,
    pub filter_bypass: bool,
    pub lfo_rate: f32,
    pub lfo_depth: f32,
    pub lfo_waveform: LfoWaveform,
}

impl Default for SlotParameters {
    fn default() -> Self {
        Self {
            volume_db: 0.0,
            pitch: 0.0,
            attack_ms: 10.0,
            decay_ms: 100.0,
            sustain_db: -6.0,
            release_ms: 500.0,
            in_point: 0.0,
            out_point: 100.0,
            looping: false,
            filter_type: SvfFilterType::LowPass,
            cutoff: 10000.0,
            resonance: 0.1,
            filter_bypass: true,
            lfo_rate: 1.0,
            lfo_depth: 0.0,
            lfo_waveform: LfoWaveform::Sine,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Frame range `[start, end)` of a sample buffer which gets played.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlayableRange {
    pub start: usize,
    pub end: usize,
}

impl PlayableRange {
    /// Resolve in and out points in percent of the given buffer length. Out is kept at least 1 %
    /// behind in, and the range is grown to at least 64 frames where the buffer allows.
    pub fn new(frame_count: usize, in_percent: f32, out_percent: f32) -> Self {
        if frame_count == 0 {
            return Self::default();
        }
        let out_percent = out_percent.max(in_percent + 1.0);
        let to_frame = |percent: f32| (percent * frame_count as f32 / 100.0) as usize;
        let start = to_frame(in_percent).min(frame_count - 1);
        let mut end = to_frame(out_percent).clamp(start + 1, frame_count);
        if end - start < MIN_PLAYABLE_FRAMES {
            end = (start + MIN_PLAYABLE_FRAMES).min(frame_count);
        }
        Self { start, end }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

// -------------------------------------------------------------------------------------------------

/// Per block precalculated values of a slot.
#[derive(Debug, Default, Clone, Copy)]
struct SlotBlockState {
    envelope_times: Option<EnvelopeTimes>,
    gain: f32,
    pitch_ratio: f64,
    range: PlayableRange,
}

// -------------------------------------------------------------------------------------------------

/// Playback state of a single sample slot within a voice.
struct SlotVoice {
    sample: Option<Shared<SampleSlot>>,
    playing: bool,
    position: f64,
    envelope: SlotEnvelope,
    coefficients: SvfCoefficients,
    filters: [SvfFilter; 2],
    lfo: Lfo,
}

impl std::fmt::Debug for SlotVoice {
    // `basedrop::Shared` does not implement `Debug`, so only show whether a sample is loaded.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotVoice")
            .field("sample", &self.sample.is_some())
            .field("playing", &self.playing)
            .field("position", &self.position)
            .field("envelope", &self.envelope)
            .field("coefficients", &self.coefficients)
            .field("filters", &self.filters)
            .field("lfo", &self.lfo)
            .finish()
    }
}

impl SlotVoice {
    fn new(sample_rate: u32) -> Self {
        let defaults = SlotParameters::default();
        Self {
            sample: None,
            playing: false,
            position: 0.0,
            envelope: SlotEnvelope::new(),
            coefficients: SvfCoefficients::new(
                defaults.filter_type,
                sample_rate,
                defaults.cutoff,
                defaults.resonance,
            ),
            filters: [SvfFilter::new(), SvfFilter::new()],
            lfo: Lfo::new(
                sample_rate,
                defaults.lfo_rate as f64,
                defaults.lfo_waveform,
            ),
        }
    }

    fn start(&mut self, sample: Shared<SampleSlot>) {
        self.sample = Some(sample);
        self.playing = true;
        self.position = 0.0;
        self.envelope.note_on();
        for filter in &mut self.filters {
            filter.reset();
        }
        self.lfo.reset();
    }

    fn stop(&mut self) {
        self.sample = None;
        self.playing = false;
        self.envelope.reset();
    }

    fn update_controls(&mut self, parameters: &SlotParameters, sample_rate: u32) {
        self.lfo.set_rate(parameters.lfo_rate as f64);
        self.lfo.set_waveform(parameters.lfo_waveform);
        if !parameters.filter_bypass {
            let base = parameters.cutoff;
            let cutoff = (base + self.lfo.peek() as f32 * base * parameters.lfo_depth)
                .clamp(MIN_MODULATED_CUTOFF, MAX_MODULATED_CUTOFF);
            self.coefficients.set(
                parameters.filter_type,
                sample_rate,
                cutoff,
                parameters.resonance,
            );
        }
    }

    /// Render a single stereo frame. Returns silence when the slot is not playing.
    #[inline]
    fn process_frame(
        &mut self,
        parameters: &SlotParameters,
        block: &SlotBlockState,
        reverse: bool,
        update_controls: bool,
        sample_rate: u32,
    ) -> [f32; 2] {
        let Some(envelope_times) = block.envelope_times.filter(|_| self.playing) else {
            return [0.0; 2];
        };

        if update_controls {
            self.update_controls(parameters, sample_rate);
        }
        self.lfo.next_value();

        let envelope = self.envelope.process(&envelope_times);
        if self.envelope.stage() == EnvelopeStage::Idle {
            self.playing = false;
            return [0.0; 2];
        }
        let Some(sample) = self.sample.as_deref() else {
            return [0.0; 2];
        };

        let range = block.range;
        let length = range.len() as f64;
        let read_position = if reverse {
            (range.end - 1) as f64 - self.position
        } else {
            range.start as f64 + self.position
        };

        let mut output = [0.0; 2];
        if read_position >= range.start as f64 && read_position < range.end as f64 {
            let index = read_position as usize;
            let next_index = (index + 1).min(sample.frame_count() - 1);
            let fraction = (read_position - index as f64) as f32;
            let read = |channel: &[f32]| {
                channel[index] * (1.0 - fraction) + channel[next_index] * fraction
            };
            let left = read(sample.channel(0));
            let right = if sample.channel_count() > 1 {
                read(sample.channel(1))
            } else {
                left
            };
            let [left, right] = if parameters.filter_bypass {
                [left, right]
            } else {
                [
                    self.filters[0].process_sample(&self.coefficients, left),
                    self.filters[1].process_sample(&self.coefficients, right),
                ]
            };
            let gain = envelope * block.gain;
            output = [sanitize(left * gain), sanitize(right * gain)];
        } else if self.position >= length {
            // end of a non looping range reached
            self.envelope.note_off();
        }

        self.position += block.pitch_ratio;
        if parameters.looping
            && self.envelope.stage() != EnvelopeStage::Release
            && self.position >= length
        {
            self.position %= length;
        }
        output
    }
}

// -------------------------------------------------------------------------------------------------

/// The note a [`SamplerVoice`] plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceNote {
    pub id: u64,
    pub channel: u8,
    pub note: u8,
}

// -------------------------------------------------------------------------------------------------

/// A single voice of the [`Sampler`](super::Sampler), playing all slots of one note.
#[derive(Debug)]
pub struct SamplerVoice {
    note: Option<VoiceNote>,
    transposed_note: i32,
    velocity: f32,
    reverse: bool,
    slots: [SlotVoice; SLOT_COUNT],
    control_counter: usize,
    release_start_frame: Option<u64>,
    sample_rate: u32,
}

impl SamplerVoice {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            note: None,
            transposed_note: ROOT_NOTE,
            velocity: 1.0,
            reverse: false,
            slots: std::array::from_fn(|_| SlotVoice::new(sample_rate)),
            control_counter: 0,
            release_start_frame: None,
            sample_rate,
        }
    }

    /// The note this voice plays. None, when stopped.
    #[inline]
    pub fn note(&self) -> Option<VoiceNote> {
        self.note
    }

    /// Is this voice currently playing something?
    #[inline]
    pub fn is_active(&self) -> bool {
        self.note.is_some()
    }

    /// True when all still playing slots are releasing.
    pub fn in_release_stage(&self) -> bool {
        self.is_active()
            && self
                .slots
                .iter()
                .filter(|slot| slot.playing)
                .all(|slot| slot.envelope.stage() == EnvelopeStage::Release)
    }

    /// Sample frame time when the voice got stopped.
    #[inline]
    pub fn release_start_frame(&self) -> Option<u64> {
        self.release_start_frame
    }

    /// Number of slots which are still playing.
    pub fn playing_slot_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.playing).count()
    }

    /// Change the sample rate. Stops the voice.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.reset();
        self.sample_rate = sample_rate;
        for slot in &mut self.slots {
            *slot = SlotVoice::new(sample_rate);
        }
    }

    /// Start playing the given note on the allocated slots. `samples` are the current slot
    /// contents: slots which are not loaded are skipped.
    pub fn start(
        &mut self,
        note: VoiceNote,
        velocity: f32,
        allocation: &SlotAllocation,
        samples: &[Shared<SampleSlot>; SLOT_COUNT],
    ) {
        self.reset();
        for (index, (slot, sample)) in self.slots.iter_mut().zip(samples).enumerate() {
            if allocation.slots.contains(index) && sample.is_loaded() {
                slot.start(Shared::clone(sample));
            }
        }
        self.note = Some(note);
        self.transposed_note = note.note as i32 + allocation.octave_shift * 12;
        self.velocity = velocity.clamp(0.0, 1.0);
        self.reverse = allocation.reverse;
        self.control_counter = 0;
    }

    /// Move all slots into their release stage.
    pub fn stop(&mut self, current_sample_frame: u64) {
        if self.is_active() {
            if self.release_start_frame.is_none() {
                self.release_start_frame = Some(current_sample_frame);
            }
            for slot in &mut self.slots {
                slot.envelope.note_off();
            }
        }
    }

    /// Stop immediately without release and free the voice.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.stop();
        }
        self.note = None;
        self.release_start_frame = None;
    }

    /// Add the voice's output to the given interleaved stereo buffer. Frees the voice once all
    /// slots have finished playing.
    pub fn process(&mut self, output: &mut [f32], parameters: &[SlotParameters; SLOT_COUNT]) {
        if !self.is_active() {
            return;
        }

        let mut blocks = [SlotBlockState::default(); SLOT_COUNT];
        for ((block, slot), parameters) in blocks.iter_mut().zip(&self.slots).zip(parameters) {
            if let Some(sample) = slot.sample.as_deref().filter(|_| slot.playing) {
                *block = SlotBlockState {
                    envelope_times: Some(EnvelopeTimes::new(
                        self.sample_rate,
                        parameters.attack_ms,
                        parameters.decay_ms,
                        parameters.sustain_db,
                        parameters.release_ms,
                    )),
                    gain: db_to_linear(parameters.volume_db) * self.velocity,
                    pitch_ratio: semitones_to_ratio(
                        (self.transposed_note - ROOT_NOTE) as f64 + parameters.pitch as f64,
                    ),
                    range: PlayableRange::new(
                        sample.frame_count(),
                        parameters.in_point,
                        parameters.out_point,
                    ),
                };
            }
        }

        for frame in output.chunks_exact_mut(2) {
            let update_controls = self.control_counter == 0;
            self.control_counter = (self.control_counter + 1) % CONTROL_RATE_DIVIDER;

            let mut any_playing = false;
            for ((slot, block), parameters) in
                self.slots.iter_mut().zip(&blocks).zip(parameters)
            {
                let [left, right] = slot.process_frame(
                    parameters,
                    block,
                    self.reverse,
                    update_controls,
                    self.sample_rate,
                );
                frame[0] += left;
                frame[1] += right;
                any_playing |= slot.playing;
            }
            if !any_playing {
                self.reset();
                break;
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use basedrop::Collector;

    use super::*;
    use crate::sampler::allocator::ActiveSlots;

    fn samples(
        collector: &Collector,
        slots: Vec<(usize, SampleSlot)>,
    ) -> [Shared<SampleSlot>; SLOT_COUNT] {
        let mut samples: [Shared<SampleSlot>; SLOT_COUNT] =
            std::array::from_fn(|_| Shared::new(&collector.handle(), SampleSlot::empty()));
        for (index, slot) in slots {
            samples[index] = Shared::new(&collector.handle(), slot);
        }
        samples
    }

    fn ramp(frame_count: usize) -> SampleSlot {
        let buffer = (0..frame_count).map(|i| i as f32).collect::<Vec<_>>();
        SampleSlot::from_planar(vec![buffer], 1000).expect("valid sample slot")
    }

    fn note(note: u8) -> VoiceNote {
        VoiceNote {
            id: 1,
            channel: 0,
            note,
        }
    }

    fn allocation(slots: ActiveSlots, octave_shift: i32, reverse: bool) -> SlotAllocation {
        SlotAllocation {
            slots,
            octave_shift,
            reverse,
        }
    }

    /// Unity gain, instant attack and sustain, no filter.
    fn flat_parameters() -> [SlotParameters; SLOT_COUNT] {
        [SlotParameters {
            attack_ms: 0.0,
            decay_ms: 0.0,
            sustain_db: 0.0,
            release_ms: 0.0,
            ..SlotParameters::default()
        }; SLOT_COUNT]
    }

    #[test]
    fn playable_range() {
        assert_eq!(
            PlayableRange::new(1000, 0.0, 100.0),
            PlayableRange { start: 0, end: 1000 }
        );
        assert_eq!(
            PlayableRange::new(1000, 50.0, 10.0),
            PlayableRange { start: 500, end: 564 }
        );
        assert_eq!(
            PlayableRange::new(10000, 50.0, 10.0),
            PlayableRange {
                start: 5000,
                end: 5100
            }
        );
        assert_eq!(
            PlayableRange::new(1000, 100.0, 100.0),
            PlayableRange { start: 999, end: 1000 }
        );
        assert_eq!(
            PlayableRange::new(10, 0.0, 50.0),
            PlayableRange { start: 0, end: 10 }
        );
        assert!(PlayableRange::new(0, 0.0, 100.0).is_empty());
    }

    #[test]
    fn plays_forward_at_root_pitch() {
        let collector = Collector::new();
        let samples = samples(&collector, vec![(0, ramp(100))]);
        let mut voice = SamplerVoice::new(1000);
        voice.start(
            note(ROOT_NOTE as u8),
            1.0,
            &allocation(ActiveSlots::single(0), 0, false),
            &samples,
        );
        let mut output = vec![0.0; 2 * 10];
        voice.process(&mut output, &flat_parameters());
        // attack is one sample long
        assert_eq!(output[0], 0.0);
        for frame in 1..10 {
            assert_eq!(output[frame * 2], frame as f32);
            assert_eq!(output[frame * 2 + 1], frame as f32);
        }
    }

    #[test]
    fn plays_reverse_and_transposed() {
        let collector = Collector::new();
        let samples = samples(&collector, vec![(2, ramp(100))]);
        let mut voice = SamplerVoice::new(1000);
        voice.start(
            note(ROOT_NOTE as u8),
            1.0,
            &allocation(ActiveSlots::single(2), 0, true),
            &samples,
        );
        let mut output = vec![0.0; 2 * 4];
        voice.process(&mut output, &flat_parameters());
        assert_eq!(output[2], 98.0);
        assert_eq!(output[4], 97.0);

        // one octave up doubles the playback speed
        let mut voice = SamplerVoice::new(1000);
        voice.start(
            note(ROOT_NOTE as u8),
            1.0,
            &allocation(ActiveSlots::single(2), 1, false),
            &samples,
        );
        let mut output = vec![0.0; 2 * 4];
        voice.process(&mut output, &flat_parameters());
        assert!((output[2] - 2.0).abs() < 1e-4);
        assert!((output[4] - 4.0).abs() < 1e-4);
    }

    #[test]
    fn reverse_playback_ends_at_the_in_point() {
        let collector = Collector::new();
        // values are index + 1, so a read of index 0 is distinguishable from silence
        let offset_ramp = |frame_count: usize| {
            let buffer = (0..frame_count).map(|i| (i + 1) as f32).collect::<Vec<_>>();
            SampleSlot::from_planar(vec![buffer], 1000).expect("valid sample slot")
        };
        let samples = samples(&collector, vec![(0, offset_ramp(100)), (1, offset_ramp(1000))]);

        let mut voice = SamplerVoice::new(1000);
        voice.start(
            note(ROOT_NOTE as u8),
            1.0,
            &allocation(ActiveSlots::single(0), 0, true),
            &samples,
        );
        let mut output = vec![0.0; 2 * 200];
        voice.process(&mut output, &flat_parameters());
        for frame in 1..100 {
            assert_eq!(output[2 * frame], (100 - frame) as f32);
        }
        let last_read = output.chunks_exact(2).rposition(|frame| frame[0] != 0.0);
        assert_eq!(last_read, Some(99));
        assert_eq!(output[2 * 99], 1.0);
        assert!(!voice.is_active());

        // with an in point, reads never go below it
        let mut parameters = flat_parameters();
        parameters[1].in_point = 50.0;
        let mut voice = SamplerVoice::new(1000);
        voice.start(
            note(ROOT_NOTE as u8),
            1.0,
            &allocation(ActiveSlots::single(1), 0, true),
            &samples,
        );
        let mut output = vec![0.0; 2 * 600];
        voice.process(&mut output, &parameters);
        assert_eq!(output[2], 999.0);
        assert!(output
            .iter()
            .all(|value| *value == 0.0 || *value >= 501.0));
        assert_eq!(
            output.iter().copied().filter(|value| *value != 0.0).reduce(f32::min),
            Some(501.0)
        );
        assert!(!voice.is_active());
    }

    #[test]
    fn layers_slots_with_velocity_and_volume() {
        let collector = Collector::new();
        let constant = |value: f32| {
            SampleSlot::from_planar(vec![vec![value; 1000]], 1000).expect("valid sample slot")
        };
        let samples = samples(&collector, vec![(0, constant(0.25)), (1, constant(0.5))]);
        let mut voice = SamplerVoice::new(1000);
        voice.start(
            note(ROOT_NOTE as u8),
            0.5,
            &allocation(ActiveSlots::ALL, 0, false),
            &samples,
        );
        // unloaded slots don't play
        assert_eq!(voice.playing_slot_count(), 2);
        let mut parameters = flat_parameters();
        parameters[1].volume_db = -6.0;
        let mut output = vec![0.0; 2 * 8];
        voice.process(&mut output, &parameters);
        let expected = (0.25 + 0.5 * db_to_linear(-6.0)) * 0.5;
        assert!((output[14] - expected).abs() < 1e-6);
        assert!((output[15] - expected).abs() < 1e-6);
    }

    #[test]
    fn releases_at_end_and_frees_voice() {
        let collector = Collector::new();
        let samples = samples(&collector, vec![(0, ramp(64))]);
        let mut voice = SamplerVoice::new(1000);
        voice.start(
            note(ROOT_NOTE as u8),
            1.0,
            &allocation(ActiveSlots::single(0), 0, false),
            &samples,
        );
        let mut parameters = flat_parameters();
        parameters[0].release_ms = 10.0;
        let mut output = vec![0.0; 2 * 128];
        voice.process(&mut output, &parameters);
        assert!(!voice.is_active());
        assert_eq!(voice.playing_slot_count(), 0);
        assert!(output[2 * 70..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn loops_until_released() {
        let collector = Collector::new();
        let samples = samples(&collector, vec![(0, ramp(64))]);
        let mut voice = SamplerVoice::new(1000);
        voice.start(
            note(ROOT_NOTE as u8),
            1.0,
            &allocation(ActiveSlots::single(0), 0, false),
            &samples,
        );
        let mut parameters = flat_parameters();
        parameters[0].looping = true;
        parameters[0].release_ms = 10.0;
        let mut output = vec![0.0; 2 * 200];
        voice.process(&mut output, &parameters);
        assert!(voice.is_active());
        // position wrapped around
        assert_eq!(output[2 * 65], 1.0);
        assert_eq!(output[2 * 130], 2.0);

        voice.stop(200);
        assert!(voice.in_release_stage());
        assert_eq!(voice.release_start_frame(), Some(200));
        let mut output = vec![0.0; 2 * 20];
        voice.process(&mut output, &parameters);
        assert!(!voice.is_active());
    }

    #[test]
    fn hard_stop_frees_immediately() {
        let collector = Collector::new();
        let samples = samples(&collector, vec![(0, ramp(1000))]);
        let mut voice = SamplerVoice::new(1000);
        voice.start(
            note(64),
            1.0,
            &allocation(ActiveSlots::single(0), 0, false),
            &samples,
        );
        assert!(voice.is_active());
        assert_eq!(voice.note().map(|n| n.note), Some(64));
        voice.reset();
        assert!(!voice.is_active());
        let mut output = vec![0.0; 2 * 16];
        voice.process(&mut output, &flat_parameters());
        assert!(output.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn filter_is_applied_when_enabled() {
        let collector = Collector::new();
        // alternating full scale signal at nyquist
        let buffer = (0..4096)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect::<Vec<_>>();
        let slot = SampleSlot::from_planar(vec![buffer], 44100).expect("valid sample slot");
        let samples = samples(&collector, vec![(0, slot)]);
        let mut voice = SamplerVoice::new(44100);
        voice.start(
            note(ROOT_NOTE as u8),
            1.0,
            &allocation(ActiveSlots::single(0), 0, false),
            &samples,
        );
        let mut parameters = flat_parameters();
        parameters[0].filter_bypass = false;
        parameters[0].cutoff = 200.0;
        parameters[0].resonance = 0.0;
        let mut output = vec![0.0; 2 * 2048];
        voice.process(&mut output, &parameters);
        let peak = output[2 * 1024..]
            .iter()
            .fold(0.0f32, |peak, v| peak.max(v.abs()));
        assert!(peak < 0.01, "peak was {peak}");
    }
}
