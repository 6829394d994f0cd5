use std::sync::Arc;

use basedrop::{Collector, Shared, SharedCell};

use crate::{utils::buffer::deinterleave, Error};

// -------------------------------------------------------------------------------------------------

/// Number of sample slots a [`SampleBank`] holds and each voice can play at once.
pub const SLOT_COUNT: usize = 5;

/// Number of peak values in a [`SampleSlot`]'s thumbnail.
pub const THUMBNAIL_POINTS: usize = 256;

/// Slot cells as shared between the bank (writer) and the audio thread (reader).
pub(crate) type SharedSampleSlots = Arc<[SharedCell<SampleSlot>; SLOT_COUNT]>;

// -------------------------------------------------------------------------------------------------

/// A decoded, already resampled mono or stereo sample buffer.
///
/// Slots are immutable once created. Replacing a slot's content in a [`SampleBank`] publishes a
/// new `SampleSlot`, so voices which still play the old one are not affected.
#[derive(Debug, Clone, Default)]
pub struct SampleSlot {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
    name: Option<String>,
    thumbnail: Vec<f32>,
}

impl SampleSlot {
    /// An unloaded slot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a slot from de-interleaved channel buffers. Accepts one or two channels of equal,
    /// non-zero length.
    pub fn from_planar(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, Error> {
        if !(1..=2).contains(&channels.len()) {
            return Err(Error::SampleSlotError(format!(
                "Unsupported channel count: {} (expected 1 or 2)",
                channels.len()
            )));
        }
        if sample_rate == 0 {
            return Err(Error::SampleSlotError("Invalid sample rate".to_owned()));
        }
        let frame_count = channels[0].len();
        if frame_count == 0 {
            return Err(Error::SampleSlotError("Empty sample buffer".to_owned()));
        }
        if channels.iter().any(|channel| channel.len() != frame_count) {
            return Err(Error::SampleSlotError(
                "All channels must have the same length".to_owned(),
            ));
        }
        let thumbnail = Self::create_thumbnail(&channels, frame_count);
        Ok(Self {
            channels,
            sample_rate,
            name: None,
            thumbnail,
        })
    }

    /// Create a slot from an interleaved buffer with the given channel layout.
    pub fn from_interleaved(
        buffer: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, Error> {
        if !(1..=2).contains(&channel_count) {
            return Err(Error::SampleSlotError(format!(
                "Unsupported channel count: {channel_count} (expected 1 or 2)"
            )));
        }
        if buffer.len() % channel_count != 0 {
            return Err(Error::SampleSlotError(
                "Interleaved buffer length is not a multiple of the channel count".to_owned(),
            ));
        }
        Self::from_planar(deinterleave(buffer, channel_count), sample_rate)
    }

    /// Builder function to attach a display name, usually the source file's name.
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// True when the slot holds sample data.
    #[inline]
    pub fn is_loaded(&self) -> bool {
        !self.channels.is_empty()
    }

    /// 1 for mono, 2 for stereo slots, 0 when empty.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Sample rate of the buffer. 0 when empty.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Optional display name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Peak values (max absolute value of all channels) for [`THUMBNAIL_POINTS`] equally sized
    /// regions of the buffer. Empty when the slot is not loaded.
    pub fn thumbnail(&self) -> &[f32] {
        &self.thumbnail
    }

    /// Sample data of the given channel.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    fn create_thumbnail(channels: &[Vec<f32>], frame_count: usize) -> Vec<f32> {
        let frames_per_point = (frame_count / THUMBNAIL_POINTS).max(1);
        (0..THUMBNAIL_POINTS)
            .map(|point| {
                let start = (point * frames_per_point).min(frame_count);
                let end = (start + frames_per_point).min(frame_count);
                channels
                    .iter()
                    .flat_map(|channel| &channel[start..end])
                    .fold(0.0f32, |peak, sample| peak.max(sample.abs()))
            })
            .collect()
    }
}

// -------------------------------------------------------------------------------------------------

/// Owner of the [`SLOT_COUNT`] sample slots an [`Engine`](crate::Engine) plays.
///
/// Lives on the loader (non real-time) thread. Loading or clearing a slot atomically swaps in a
/// new [`SampleSlot`]. The audio thread picks up the current slot content at note-on, and voices
/// keep using the buffer they started with until they finish. Buffers which are no longer
/// referenced get dropped here, in [`Self::collect_garbage`] or when loading, never in the audio
/// thread.
pub struct SampleBank {
    collector: Collector,
    slots: SharedSampleSlots,
}

impl SampleBank {
    /// Create a new bank with all slots empty.
    pub fn new() -> Self {
        let collector = Collector::new();
        let handle = collector.handle();
        let slots = Arc::new(std::array::from_fn(|_| {
            SharedCell::new(Shared::new(&handle, SampleSlot::empty()))
        }));
        Self { collector, slots }
    }

    /// Publish a new sample into the given slot.
    pub fn load(&mut self, index: usize, slot: SampleSlot) -> Result<(), Error> {
        Self::validate_index(index)?;
        if !slot.is_loaded() {
            return Err(Error::SampleSlotError(
                "Can't load an empty sample slot. Use `clear` instead.".to_owned(),
            ));
        }
        log::info!(
            "Loading sample '{}' into slot #{index} ({} frames, {} channels, {} Hz)",
            slot.name().unwrap_or("unnamed"),
            slot.frame_count(),
            slot.channel_count(),
            slot.sample_rate()
        );
        self.publish(index, slot);
        Ok(())
    }

    /// Remove the sample from the given slot.
    pub fn clear(&mut self, index: usize) -> Result<(), Error> {
        Self::validate_index(index)?;
        log::info!("Clearing sample slot #{index}");
        self.publish(index, SampleSlot::empty());
        Ok(())
    }

    /// Current content of the given slot.
    pub fn slot(&self, index: usize) -> Result<Shared<SampleSlot>, Error> {
        Self::validate_index(index)?;
        Ok(self.slots[index].get())
    }

    /// True when the given slot holds sample data.
    pub fn is_loaded(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|cell| cell.get().is_loaded())
    }

    /// Drop replaced slot buffers which are no longer used by any voice.
    pub fn collect_garbage(&mut self) {
        self.collector.collect();
    }

    pub(crate) fn shared_slots(&self) -> SharedSampleSlots {
        Arc::clone(&self.slots)
    }

    fn publish(&mut self, index: usize, slot: SampleSlot) {
        let slot = Shared::new(&self.collector.handle(), slot);
        self.slots[index].set(slot);
        self.collector.collect();
    }

    fn validate_index(index: usize) -> Result<(), Error> {
        if index < SLOT_COUNT {
            Ok(())
        } else {
            Err(Error::SlotIndexError(index))
        }
    }
}

impl Default for SampleBank {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------
