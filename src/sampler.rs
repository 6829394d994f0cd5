use basedrop::Shared;

use crate::utils::buffer::clear_buffer;

// -------------------------------------------------------------------------------------------------

pub mod allocator;
pub mod envelope;
pub mod slot;
pub mod voice;

use allocator::{ActiveSlots, PlaybackMode, VoiceAllocator};
use slot::{SampleSlot, SharedSampleSlots, SLOT_COUNT};
use voice::{SamplerVoice, SlotParameters, VoiceNote};

// -------------------------------------------------------------------------------------------------

/// Number of preallocated voices in a [`Sampler`].
pub const VOICE_COUNT: usize = 16;

// -------------------------------------------------------------------------------------------------

/// MIDI-like note messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteMessage {
    /// Start a note. Velocity is normalized to `0..=1`, and a zero velocity stops the note.
    NoteOn { channel: u8, note: u8, velocity: f32 },
    /// Release, or when `allow_tail_off` is false immediately stop, all voices playing the given
    /// note on the given channel.
    NoteOff {
        channel: u8,
        note: u8,
        allow_tail_off: bool,
    },
    /// Release or, when `allow_tail_off` is false, immediately stop all voices.
    AllNotesOff { allow_tail_off: bool },
}

/// A [`NoteMessage`] with a frame offset within the block it gets processed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub frame_offset: usize,
    pub message: NoteMessage,
}

impl NoteEvent {
    /// Note-on event at the start of the block.
    pub fn note_on(channel: u8, note: u8, velocity: f32) -> Self {
        Self::from(NoteMessage::NoteOn {
            channel,
            note,
            velocity,
        })
    }

    /// Note-off event at the start of the block.
    pub fn note_off(channel: u8, note: u8, allow_tail_off: bool) -> Self {
        Self::from(NoteMessage::NoteOff {
            channel,
            note,
            allow_tail_off,
        })
    }

    /// All-notes-off event at the start of the block.
    pub fn all_notes_off(allow_tail_off: bool) -> Self {
        Self::from(NoteMessage::AllNotesOff { allow_tail_off })
    }

    /// Builder function to move the event to the given frame offset within the block.
    #[must_use]
    pub fn at_frame(mut self, frame_offset: usize) -> Self {
        self.frame_offset = frame_offset;
        self
    }
}

impl From<NoteMessage> for NoteEvent {
    fn from(message: NoteMessage) -> Self {
        Self {
            frame_offset: 0,
            message,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Parameter snapshot for the sampler, read once per block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerParameters {
    pub slots: [SlotParameters; SLOT_COUNT],
    pub playback_mode: PlaybackMode,
    pub random_octave: bool,
    pub reverse: bool,
}

impl Default for SamplerParameters {
    fn default() -> Self {
        Self {
            slots: [SlotParameters::default(); SLOT_COUNT],
            playback_mode: PlaybackMode::Layer,
            random_octave: false,
            reverse: false,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Polyphonic sampler, playing up to [`SLOT_COUNT`] sample slots per note on a fixed number of
/// [`VOICE_COUNT`] voices.
///
/// Renders interleaved stereo output. All voices get allocated upfront, so note handling and
/// rendering never allocate.
pub struct Sampler {
    slots: SharedSampleSlots,
    voices: Vec<SamplerVoice>,
    allocator: VoiceAllocator,
    next_note_id: u64,
    current_frame: u64,
    sample_rate: u32,
}

impl Sampler {
    /// Create a new sampler, reading samples from the given slots.
    pub(crate) fn new(slots: SharedSampleSlots, sample_rate: u32) -> Self {
        let voices = (0..VOICE_COUNT)
            .map(|_| SamplerVoice::new(sample_rate))
            .collect();
        Self {
            slots,
            voices,
            allocator: VoiceAllocator::new(),
            next_note_id: 0,
            current_frame: 0,
            sample_rate,
        }
    }

    /// Builder function to use a deterministic voice allocator.
    #[cfg(test)]
    pub(crate) fn with_allocator(mut self, allocator: VoiceAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// Output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Apply a new sample rate. Stops all voices.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        for voice in &mut self.voices {
            voice.set_sample_rate(sample_rate);
        }
        self.current_frame = 0;
    }

    /// Number of voices which are currently playing.
    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|voice| voice.is_active()).count()
    }

    /// Immediately handle the given note message.
    pub fn handle_message(&mut self, message: &NoteMessage, parameters: &SamplerParameters) {
        match *message {
            NoteMessage::NoteOn {
                channel,
                note,
                velocity,
            } => self.note_on(channel, note, velocity, parameters),
            NoteMessage::NoteOff {
                channel,
                note,
                allow_tail_off,
            } => self.note_off(channel, note, allow_tail_off),
            NoteMessage::AllNotesOff { allow_tail_off } => self.all_notes_off(allow_tail_off),
        }
    }

    /// Start a new note on the currently loaded slots. Does nothing when no slot is loaded.
    pub fn note_on(&mut self, channel: u8, note: u8, velocity: f32, parameters: &SamplerParameters) {
        if velocity <= 0.0 || !velocity.is_finite() {
            self.note_off(channel, note, true);
            return;
        }

        let samples: [Shared<SampleSlot>; SLOT_COUNT] =
            std::array::from_fn(|index| self.slots[index].get());
        let loaded = ActiveSlots::from_fn(|index| samples[index].is_loaded());
        let Some(allocation) = self.allocator.allocate(
            loaded,
            parameters.playback_mode,
            parameters.random_octave,
            parameters.reverse,
        ) else {
            return;
        };

        // a retriggered note replaces the previous one
        self.note_off(channel, note, true);

        let voice_index = self.next_free_voice_index();
        let note = VoiceNote {
            id: self.next_note_id,
            channel,
            note,
        };
        self.next_note_id += 1;
        self.voices[voice_index].start(note, velocity, &allocation, &samples);
    }

    /// Release all voices which play the given note, or stop them immediately when
    /// `allow_tail_off` is false.
    pub fn note_off(&mut self, channel: u8, note: u8, allow_tail_off: bool) {
        for voice in &mut self.voices {
            if voice
                .note()
                .is_some_and(|n| n.channel == channel && n.note == note)
            {
                if allow_tail_off {
                    voice.stop(self.current_frame);
                } else {
                    voice.reset();
                }
            }
        }
    }

    /// Release all voices, or stop them immediately when `allow_tail_off` is false.
    pub fn all_notes_off(&mut self, allow_tail_off: bool) {
        for voice in &mut self.voices {
            if allow_tail_off {
                voice.stop(self.current_frame);
            } else {
                voice.reset();
            }
        }
    }

    /// Render all voices into the given interleaved stereo buffer, overwriting its content.
    ///
    /// Events get applied at their frame offsets. Offsets beyond the block are applied at the end
    /// of the block, offsets before an already applied event's offset immediately.
    pub fn process(
        &mut self,
        output: &mut [f32],
        events: &[NoteEvent],
        parameters: &SamplerParameters,
    ) {
        clear_buffer(output);
        let frame_count = output.len() / 2;
        let mut rendered_frames = 0;
        for event in events {
            let frame_offset = event.frame_offset.min(frame_count);
            if frame_offset > rendered_frames {
                self.render(
                    &mut output[rendered_frames * 2..frame_offset * 2],
                    parameters,
                );
                rendered_frames = frame_offset;
            }
            self.handle_message(&event.message, parameters);
        }
        if rendered_frames < frame_count {
            self.render(&mut output[rendered_frames * 2..frame_count * 2], parameters);
        }
    }

    /// Add all active voices to the given interleaved stereo buffer.
    fn render(&mut self, output: &mut [f32], parameters: &SamplerParameters) {
        for voice in &mut self.voices {
            if voice.is_active() {
                voice.process(output, &parameters.slots);
            }
        }
        self.current_frame += (output.len() / 2) as u64;
    }

    /// Find a free voice or steal one.
    /// Returns the index of the new voice, which is always valid.
    fn next_free_voice_index(&self) -> usize {
        // Try to find a completely free voice first
        if let Some(index) = self.voices.iter().position(|v| !v.is_active()) {
            return index;
        }
        // If all voices are active, find the best candidate to steal
        // Prioritize:
        //   a) Longest releasing voice (earliest release start frame)
        //   b) Oldest active voice (by note id)
        let mut candidate_index = 0;
        let mut earliest_release_time: Option<u64> = None;
        let mut oldest_note_id: Option<u64> = None;
        for (index, voice) in self.voices.iter().enumerate() {
            if voice.in_release_stage() {
                if let Some(release_time) = voice.release_start_frame() {
                    if earliest_release_time.is_none_or(|earliest| release_time < earliest) {
                        earliest_release_time = Some(release_time);
                        oldest_note_id = None;
                        candidate_index = index;
                    }
                    continue;
                }
            }
            if earliest_release_time.is_none() {
                if let Some(note) = voice.note() {
                    if oldest_note_id.is_none_or(|oldest| note.id < oldest) {
                        oldest_note_id = Some(note.id);
                        candidate_index = index;
                    }
                }
            }
        }
        log::debug!("Stealing sampler voice #{candidate_index}");
        candidate_index
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sampler::slot::SampleBank, Error};

    fn bank_with_slots(slots: &[usize]) -> Result<SampleBank, Error> {
        let mut bank = SampleBank::new();
        for index in slots {
            bank.load(
                *index,
                SampleSlot::from_planar(vec![vec![0.5; 44100]], 44100)?,
            )?;
        }
        Ok(bank)
    }

    fn sampler(bank: &SampleBank) -> Sampler {
        Sampler::new(bank.shared_slots(), 44100).with_allocator(VoiceAllocator::with_seed(7))
    }

    #[test]
    fn silent_without_loaded_slots() -> Result<(), Error> {
        let bank = bank_with_slots(&[])?;
        let mut sampler = sampler(&bank);
        let parameters = SamplerParameters::default();
        let mut output = vec![1.0; 256];
        sampler.process(&mut output, &[NoteEvent::note_on(0, 60, 1.0)], &parameters);
        assert_eq!(sampler.active_voice_count(), 0);
        assert!(output.iter().all(|v| *v == 0.0));
        Ok(())
    }

    #[test]
    fn note_on_and_off() -> Result<(), Error> {
        let bank = bank_with_slots(&[0, 3])?;
        let mut sampler = sampler(&bank);
        let parameters = SamplerParameters::default();
        let mut output = vec![0.0; 256];
        sampler.process(
            &mut output,
            &[NoteEvent::note_on(0, 60, 1.0), NoteEvent::note_on(0, 64, 1.0)],
            &parameters,
        );
        assert_eq!(sampler.active_voice_count(), 2);
        assert!(output[64..].iter().all(|v| *v > 0.0));

        // zero velocity note-ons are note-offs
        sampler.process(&mut output, &[NoteEvent::note_on(0, 60, 0.0)], &parameters);
        sampler.process(&mut output, &[NoteEvent::note_off(0, 64, true)], &parameters);
        assert!(sampler
            .voices
            .iter()
            .filter(|voice| voice.is_active())
            .all(|voice| voice.in_release_stage()));

        // default release is 500 ms
        let mut output = vec![0.0; 2 * 44100];
        sampler.process(&mut output, &[], &parameters);
        assert_eq!(sampler.active_voice_count(), 0);
        Ok(())
    }

    #[test]
    fn retrigger_releases_previous_voice() -> Result<(), Error> {
        let bank = bank_with_slots(&[0])?;
        let mut sampler = sampler(&bank);
        let parameters = SamplerParameters::default();
        let mut output = vec![0.0; 256];
        sampler.process(&mut output, &[NoteEvent::note_on(0, 60, 1.0)], &parameters);
        sampler.process(&mut output, &[NoteEvent::note_on(0, 60, 1.0)], &parameters);
        assert_eq!(sampler.active_voice_count(), 2);
        assert_eq!(
            sampler
                .voices
                .iter()
                .filter(|voice| voice.in_release_stage())
                .count(),
            1
        );
        // other channels are independent
        sampler.process(&mut output, &[NoteEvent::note_on(1, 60, 1.0)], &parameters);
        assert_eq!(
            sampler
                .voices
                .iter()
                .filter(|voice| voice.in_release_stage())
                .count(),
            1
        );
        Ok(())
    }

    #[test]
    fn all_notes_off() -> Result<(), Error> {
        let bank = bank_with_slots(&[1])?;
        let mut sampler = sampler(&bank);
        let parameters = SamplerParameters::default();
        let mut output = vec![0.0; 256];
        let notes = (60..64)
            .map(|note| NoteEvent::note_on(0, note, 1.0))
            .collect::<Vec<_>>();
        sampler.process(&mut output, &notes, &parameters);
        assert_eq!(sampler.active_voice_count(), 4);

        sampler.process(&mut output, &[NoteEvent::all_notes_off(true)], &parameters);
        assert_eq!(sampler.active_voice_count(), 4);
        assert!(output.iter().any(|v| *v != 0.0));

        sampler.process(&mut output, &[NoteEvent::all_notes_off(false)], &parameters);
        assert_eq!(sampler.active_voice_count(), 0);
        assert!(output.iter().all(|v| *v == 0.0));
        Ok(())
    }

    #[test]
    fn hard_note_off_skips_release() -> Result<(), Error> {
        let bank = bank_with_slots(&[0])?;
        let mut sampler = sampler(&bank);
        let parameters = SamplerParameters::default();
        let mut output = vec![0.0; 2 * 128];
        sampler.process(
            &mut output,
            &[NoteEvent::note_on(0, 60, 1.0), NoteEvent::note_on(0, 62, 1.0)],
            &parameters,
        );
        assert_eq!(sampler.active_voice_count(), 2);

        // stops note 60 at frame 64 without a release ramp, note 62 keeps playing
        let mut single_note = vec![0.0; 2 * 128];
        let mut reference = self::sampler(&bank);
        reference.process(
            &mut single_note,
            &[NoteEvent::note_on(0, 62, 1.0)],
            &parameters,
        );
        reference.process(&mut single_note, &[], &parameters);

        sampler.process(
            &mut output,
            &[NoteEvent::note_off(0, 60, false).at_frame(64)],
            &parameters,
        );
        assert_eq!(sampler.active_voice_count(), 1);
        let voice = sampler.voices.iter().find(|voice| voice.is_active());
        assert!(voice.is_some_and(|voice| !voice.in_release_stage()));
        assert_eq!(voice.and_then(|voice| voice.note()).map(|n| n.note), Some(62));
        assert_eq!(output[2 * 64..], single_note[2 * 64..]);
        Ok(())
    }

    #[test]
    fn events_are_sample_accurate() -> Result<(), Error> {
        let bank = bank_with_slots(&[0])?;
        let mut sampler = sampler(&bank);
        let parameters = SamplerParameters::default();
        let mut output = vec![0.0; 2 * 128];
        sampler.process(
            &mut output,
            &[NoteEvent::note_on(0, 60, 1.0).at_frame(100)],
            &parameters,
        );
        assert!(output[..2 * 101].iter().all(|v| *v == 0.0));
        assert!(output[2 * 101..].iter().all(|v| *v > 0.0));

        // offsets past the block end apply at the end
        sampler.process(
            &mut output,
            &[NoteEvent::all_notes_off(false).at_frame(1000)],
            &parameters,
        );
        assert!(output.iter().all(|v| *v > 0.0));
        assert_eq!(sampler.active_voice_count(), 0);
        Ok(())
    }

    #[test]
    fn steals_oldest_voices() -> Result<(), Error> {
        let bank = bank_with_slots(&[0])?;
        let mut sampler = sampler(&bank);
        let parameters = SamplerParameters::default();
        let mut output = vec![0.0; 64];
        for note in 0..VOICE_COUNT as u8 {
            sampler.process(&mut output, &[NoteEvent::note_on(0, note, 1.0)], &parameters);
        }
        assert_eq!(sampler.active_voice_count(), VOICE_COUNT);

        // no releasing voice: the oldest note gets stolen
        sampler.process(&mut output, &[NoteEvent::note_on(0, 100, 1.0)], &parameters);
        assert_eq!(sampler.active_voice_count(), VOICE_COUNT);
        let playing = |sampler: &Sampler, note: u8| {
            sampler
                .voices
                .iter()
                .any(|voice| voice.note().is_some_and(|n| n.note == note))
        };
        assert!(!playing(&sampler, 0));
        assert!(playing(&sampler, 100));

        // releasing voices get stolen before older, still held ones
        sampler.process(&mut output, &[NoteEvent::note_off(0, 5, true)], &parameters);
        sampler.process(&mut output, &[NoteEvent::note_on(0, 101, 1.0)], &parameters);
        assert!(!playing(&sampler, 5));
        assert!(playing(&sampler, 1));
        assert!(playing(&sampler, 101));
        Ok(())
    }

    #[test]
    fn round_robin_plays_one_slot_per_note() -> Result<(), Error> {
        let bank = bank_with_slots(&[0, 1, 2])?;
        let mut sampler = sampler(&bank);
        let parameters = SamplerParameters {
            playback_mode: PlaybackMode::RoundRobin,
            ..SamplerParameters::default()
        };
        let mut output = vec![0.0; 64];
        sampler.process(
            &mut output,
            &[NoteEvent::note_on(0, 60, 1.0), NoteEvent::note_on(0, 62, 1.0)],
            &parameters,
        );
        assert_eq!(sampler.active_voice_count(), 2);
        assert!(sampler
            .voices
            .iter()
            .filter(|voice| voice.is_active())
            .all(|voice| voice.playing_slot_count() == 1));
        Ok(())
    }
}
