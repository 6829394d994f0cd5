use rand::{rngs::SmallRng, Rng, SeedableRng};

use super::slot::SLOT_COUNT;

// -------------------------------------------------------------------------------------------------

/// Fixed size set of slot indices, stored as a bitmask.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActiveSlots(u8);

impl ActiveSlots {
    /// No slot.
    pub const NONE: Self = Self(0);
    /// All [`SLOT_COUNT`] slots.
    pub const ALL: Self = Self((1 << SLOT_COUNT) - 1);

    /// A set with the single given slot index.
    pub const fn single(index: usize) -> Self {
        debug_assert!(index < SLOT_COUNT);
        Self(1 << index)
    }

    /// Create a set from the slot indices for which `predicate` returns true.
    pub fn from_fn<F: FnMut(usize) -> bool>(mut predicate: F) -> Self {
        (0..SLOT_COUNT).fold(Self::NONE, |slots, index| {
            if predicate(index) {
                slots.with(index)
            } else {
                slots
            }
        })
    }

    /// Returns a copy of the set with the given index added.
    #[must_use]
    pub const fn with(self, index: usize) -> Self {
        debug_assert!(index < SLOT_COUNT);
        Self(self.0 | (1 << index))
    }

    #[inline]
    pub const fn contains(&self, index: usize) -> bool {
        index < SLOT_COUNT && self.0 & (1 << index) != 0
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// The `n`th slot index in the set in ascending order.
    pub fn nth(&self, n: usize) -> Option<usize> {
        self.iter().nth(n)
    }

    /// Iterate over all contained slot indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..SLOT_COUNT).filter(|index| self.contains(*index))
    }
}

// -------------------------------------------------------------------------------------------------

/// How the loaded slots get distributed to new notes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum PlaybackMode {
    /// All loaded slots play at once.
    #[default]
    Layer,
    /// A single, randomly picked slot plays.
    Random,
    /// Loaded slots play one after another.
    #[strum(serialize = "Round Robin")]
    RoundRobin,
}

impl PlaybackMode {
    /// Resolve the mode from the layer and random flags. Random wins over layer, and round-robin
    /// applies when neither is set.
    pub fn from_flags(layer: bool, random: bool) -> Self {
        if random {
            Self::Random
        } else if layer {
            Self::Layer
        } else {
            Self::RoundRobin
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Slots and playback modifiers for a single note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAllocation {
    pub slots: ActiveSlots,
    pub octave_shift: i32,
    pub reverse: bool,
}

// -------------------------------------------------------------------------------------------------

/// Picks the slots and octave shift for new notes.
#[derive(Debug, Clone)]
pub struct VoiceAllocator {
    round_robin_counter: usize,
    rng: SmallRng,
}

impl VoiceAllocator {
    const OCTAVE_DOWN_PROBABILITY: f32 = 0.2;
    const OCTAVE_UP_PROBABILITY: f32 = 0.2;

    /// Create a new allocator with a randomly seeded generator.
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_os_rng())
    }

    /// Create a new allocator with a deterministic random generator.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        Self {
            round_robin_counter: 0,
            rng,
        }
    }

    /// Allocate slots for a new note. Returns `None` when no slot is loaded.
    pub fn allocate(
        &mut self,
        loaded: ActiveSlots,
        mode: PlaybackMode,
        random_octave: bool,
        reverse: bool,
    ) -> Option<SlotAllocation> {
        let slots = self.select_slots(loaded, mode)?;
        let octave_shift = if random_octave {
            self.random_octave_shift()
        } else {
            0
        };
        Some(SlotAllocation {
            slots,
            octave_shift,
            reverse,
        })
    }

    /// Select the slots that play for a new note from the loaded ones.
    pub fn select_slots(&mut self, loaded: ActiveSlots, mode: PlaybackMode) -> Option<ActiveSlots> {
        if loaded.is_empty() {
            return None;
        }
        let index = match mode {
            PlaybackMode::Layer => return Some(loaded),
            PlaybackMode::Random => self.rng.random_range(0..loaded.len()),
            PlaybackMode::RoundRobin => {
                self.round_robin_counter = (self.round_robin_counter + 1) % loaded.len();
                self.round_robin_counter
            }
        };
        loaded.nth(index).map(ActiveSlots::single)
    }

    /// -1, 0 or +1 octaves with 20 %, 60 % and 20 % probability.
    pub fn random_octave_shift(&mut self) -> i32 {
        let value = self.rng.random::<f32>();
        if value < Self::OCTAVE_DOWN_PROBABILITY {
            -1
        } else if value < Self::OCTAVE_DOWN_PROBABILITY + Self::OCTAVE_UP_PROBABILITY {
            1
        } else {
            0
        }
    }
}

impl Default for VoiceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------
