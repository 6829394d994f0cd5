//! Parameter layout of the [`Engine`](crate::Engine): master, playback, per slot and effect
//! parameters, and their lookup from the [`ParameterStore`].

use four_cc::FourCC;
use strum::{EnumCount, IntoEnumIterator};

use crate::{
    parameter::{BooleanParameter, EnumParameter, FloatParameter, Parameter, ParameterScaling},
    sampler::{
        allocator::PlaybackMode,
        slot::SLOT_COUNT,
        voice::SlotParameters,
        SamplerParameters,
    },
    utils::dsp::{filters::svf::SvfFilterType, lfo::LfoWaveform},
    Error, ParameterStore,
};

// -------------------------------------------------------------------------------------------------

pub const MASTER_VOLUME: FloatParameter =
    FloatParameter::new(FourCC(*b"MVOL"), "Master Volume", -60.0..=12.0, 0.0).with_unit("dB");
pub const STEREO_WIDTH: FloatParameter =
    FloatParameter::new(FourCC(*b"MWID"), "Stereo Width", 0.0..=200.0, 100.0).with_unit("%");

pub const PLAYBACK_LAYER: BooleanParameter =
    BooleanParameter::new(FourCC(*b"PLAY"), "Layer", true);
pub const PLAYBACK_RANDOM: BooleanParameter =
    BooleanParameter::new(FourCC(*b"PRND"), "Random", false);
pub const RANDOM_OCTAVE: BooleanParameter =
    BooleanParameter::new(FourCC(*b"ROCT"), "Random Octave", false);
pub const REVERSE: BooleanParameter = BooleanParameter::new(FourCC(*b"RVRS"), "Reverse", false);

pub const DELAY_BYPASS: BooleanParameter =
    BooleanParameter::new(FourCC(*b"DBYP"), "Delay Bypass", true);
pub const CHORUS_BYPASS: BooleanParameter =
    BooleanParameter::new(FourCC(*b"CBYP"), "Chorus Bypass", true);
pub const TAPE_BYPASS: BooleanParameter =
    BooleanParameter::new(FourCC(*b"TBYP"), "Tape Bypass", true);
pub const SPECTRAL_BYPASS: BooleanParameter =
    BooleanParameter::new(FourCC(*b"SBYP"), "Spectral Bypass", true);

/// Master and playback mode parameter descriptors.
pub fn global_parameters() -> Vec<Box<dyn Parameter>> {
    vec![
        Box::new(MASTER_VOLUME),
        Box::new(STEREO_WIDTH),
        Box::new(PLAYBACK_LAYER),
        Box::new(PLAYBACK_RANDOM),
        Box::new(RANDOM_OCTAVE),
        Box::new(REVERSE),
    ]
}

// -------------------------------------------------------------------------------------------------

/// Parameters every sample slot has. Ids are `S`, the slot number `1`-`5` and a two letter tag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, strum::EnumIter, strum::EnumCount,
)]
pub enum SlotParameter {
    Volume,
    Pitch,
    Attack,
    Decay,
    Sustain,
    Release,
    #[strum(serialize = "In")]
    InPoint,
    #[strum(serialize = "Out")]
    OutPoint,
    Loop,
    #[strum(serialize = "Filter Type")]
    FilterType,
    Cutoff,
    Resonance,
    #[strum(serialize = "Filter Bypass")]
    FilterBypass,
    #[strum(serialize = "LFO Rate")]
    LfoRate,
    #[strum(serialize = "LFO Depth")]
    LfoDepth,
    #[strum(serialize = "LFO Waveform")]
    LfoWaveform,
}

impl SlotParameter {
    const MAX_TIME_MS: f32 = 10000.0;

    const fn tag(self) -> [u8; 2] {
        match self {
            Self::Volume => *b"VL",
            Self::Pitch => *b"PT",
            Self::Attack => *b"AT",
            Self::Decay => *b"DC",
            Self::Sustain => *b"ST",
            Self::Release => *b"RL",
            Self::InPoint => *b"IN",
            Self::OutPoint => *b"OT",
            Self::Loop => *b"LP",
            Self::FilterType => *b"FT",
            Self::Cutoff => *b"FC",
            Self::Resonance => *b"FR",
            Self::FilterBypass => *b"FB",
            Self::LfoRate => *b"LR",
            Self::LfoDepth => *b"LD",
            Self::LfoWaveform => *b"LW",
        }
    }

    /// Parameter id of this parameter in the given slot.
    pub const fn id(self, slot: usize) -> FourCC {
        assert!(slot < SLOT_COUNT, "Invalid slot index");
        let [tag0, tag1] = self.tag();
        FourCC([b'S', b'1' + slot as u8, tag0, tag1])
    }

    /// Parameter descriptor of this parameter in the given slot.
    pub fn description(self, slot: usize) -> Box<dyn Parameter> {
        let id = self.id(slot);
        let name: &'static str = self.into();
        let time = |default| {
            FloatParameter::new(id, name, 0.0..=Self::MAX_TIME_MS, default)
                .with_unit("ms")
                .with_scaling(ParameterScaling::Exponential(3.0))
        };
        match self {
            Self::Volume => Box::new(
                FloatParameter::new(id, name, -60.0..=12.0, 0.0).with_unit("dB"),
            ),
            Self::Pitch => Box::new(
                FloatParameter::new(id, name, -24.0..=24.0, 0.0).with_unit("st"),
            ),
            Self::Attack => Box::new(time(10.0)),
            Self::Decay => Box::new(time(100.0)),
            Self::Sustain => Box::new(
                FloatParameter::new(id, name, -60.0..=0.0, -6.0).with_unit("dB"),
            ),
            Self::Release => Box::new(time(500.0)),
            Self::InPoint => {
                Box::new(FloatParameter::new(id, name, 0.0..=100.0, 0.0).with_unit("%"))
            }
            Self::OutPoint => {
                Box::new(FloatParameter::new(id, name, 0.0..=100.0, 100.0).with_unit("%"))
            }
            Self::Loop => Box::new(BooleanParameter::new(id, name, false)),
            Self::FilterType => Box::new(EnumParameter::new(
                id,
                name,
                SvfFilterType::LowPass,
            )),
            Self::Cutoff => Box::new(
                FloatParameter::new(id, name, 20.0..=20000.0, 10000.0)
                    .with_unit("Hz")
                    .with_scaling(ParameterScaling::Exponential(3.0)),
            ),
            Self::Resonance => Box::new(FloatParameter::new(id, name, 0.0..=1.0, 0.1)),
            Self::FilterBypass => Box::new(BooleanParameter::new(id, name, true)),
            Self::LfoRate => Box::new(
                FloatParameter::new(id, name, 0.01..=20.0, 1.0)
                    .with_unit("Hz")
                    .with_scaling(ParameterScaling::Exponential(2.0)),
            ),
            Self::LfoDepth => Box::new(FloatParameter::new(id, name, 0.0..=1.0, 0.0)),
            Self::LfoWaveform => {
                Box::new(EnumParameter::new(id, name, LfoWaveform::Sine))
            }
        }
    }
}

/// Parameter descriptors of all slots.
pub fn slot_parameters() -> Vec<Box<dyn Parameter>> {
    (0..SLOT_COUNT)
        .flat_map(|slot| SlotParameter::iter().map(move |parameter| parameter.description(slot)))
        .collect()
}

// -------------------------------------------------------------------------------------------------

/// Store indices of the master and sampler parameters, resolved once, so the audio thread can
/// read them without id lookups.
#[derive(Debug, Clone)]
pub(crate) struct ParameterIndices {
    master_volume: usize,
    stereo_width: usize,
    layer: usize,
    random: usize,
    random_octave: usize,
    reverse: usize,
    slots: [[usize; SlotParameter::COUNT]; SLOT_COUNT],
}

impl ParameterIndices {
    pub fn resolve(store: &ParameterStore) -> Result<Self, Error> {
        let index_of = |id: FourCC| {
            store
                .index_of(id)
                .ok_or_else(|| Error::ParameterError(format!("Missing parameter '{id}'")))
        };
        let mut slots = [[0; SlotParameter::COUNT]; SLOT_COUNT];
        for (slot, indices) in slots.iter_mut().enumerate() {
            for (index, parameter) in indices.iter_mut().zip(SlotParameter::iter()) {
                *index = index_of(parameter.id(slot))?;
            }
        }
        Ok(Self {
            master_volume: index_of(MASTER_VOLUME.id())?,
            stereo_width: index_of(STEREO_WIDTH.id())?,
            layer: index_of(PLAYBACK_LAYER.id())?,
            random: index_of(PLAYBACK_RANDOM.id())?,
            random_octave: index_of(RANDOM_OCTAVE.id())?,
            reverse: index_of(REVERSE.id())?,
            slots,
        })
    }

    /// Master volume in dB and stereo width as factor (1 = unchanged).
    pub fn master(&self, store: &ParameterStore) -> (f32, f32) {
        (
            store.value_at(self.master_volume),
            store.value_at(self.stereo_width) / 100.0,
        )
    }

    /// Read a snapshot of all sampler parameters.
    pub fn sampler_parameters(&self, store: &ParameterStore) -> SamplerParameters {
        let flag = |index: usize| store.value_at(index) > 0.5;
        SamplerParameters {
            slots: std::array::from_fn(|slot| self.slot_parameters(store, slot)),
            playback_mode: PlaybackMode::from_flags(flag(self.layer), flag(self.random)),
            random_octave: flag(self.random_octave),
            reverse: flag(self.reverse),
        }
    }

    fn slot_parameters(&self, store: &ParameterStore, slot: usize) -> SlotParameters {
        let indices = &self.slots[slot];
        let value = |parameter: SlotParameter| store.value_at(indices[parameter as usize]);
        let flag = |parameter: SlotParameter| value(parameter) > 0.5;
        let choice = |parameter: SlotParameter| value(parameter).round().max(0.0) as usize;
        SlotParameters {
            volume_db: value(SlotParameter::Volume),
            pitch: value(SlotParameter::Pitch),
            attack_ms: value(SlotParameter::Attack),
            decay_ms: value(SlotParameter::Decay),
            sustain_db: value(SlotParameter::Sustain),
            release_ms: value(SlotParameter::Release),
            in_point: value(SlotParameter::InPoint),
            out_point: value(SlotParameter::OutPoint),
            looping: flag(SlotParameter::Loop),
            filter_type: SvfFilterType::from_repr(choice(SlotParameter::FilterType))
                .unwrap_or_default(),
            cutoff: value(SlotParameter::Cutoff),
            resonance: value(SlotParameter::Resonance),
            filter_bypass: flag(SlotParameter::FilterBypass),
            lfo_rate: value(SlotParameter::LfoRate),
            lfo_depth: value(SlotParameter::LfoDepth),
            lfo_waveform: LfoWaveform::from_repr(choice(SlotParameter::LfoWaveform))
                .unwrap_or_default(),
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ParameterStore {
        let mut parameters = global_parameters();
        parameters.extend(slot_parameters());
        ParameterStore::new(parameters).expect("valid parameter layout")
    }

    #[test]
    fn slot_parameter_ids() {
        assert_eq!(SlotParameter::Volume.id(0), FourCC(*b"S1VL"));
        assert_eq!(SlotParameter::LfoWaveform.id(4), FourCC(*b"S5LW"));
        assert_eq!(slot_parameters().len(), SLOT_COUNT * SlotParameter::COUNT);
    }

    #[test]
    fn default_snapshot() -> Result<(), Error> {
        let store = store();
        let indices = ParameterIndices::resolve(&store)?;
        assert_eq!(indices.master(&store), (0.0, 1.0));
        assert_eq!(
            indices.sampler_parameters(&store),
            SamplerParameters::default()
        );
        Ok(())
    }

    #[test]
    fn snapshot_follows_store() -> Result<(), Error> {
        let store = store();
        let indices = ParameterIndices::resolve(&store)?;
        store.set_value(PLAYBACK_RANDOM.id(), 1.0)?;
        store.set_value(REVERSE.id(), 1.0)?;
        store.set_value(SlotParameter::FilterType.id(2), 2.0)?;
        store.set_value(SlotParameter::LfoWaveform.id(2), 3.0)?;
        store.set_value(SlotParameter::Pitch.id(2), -7.0)?;
        store.set_value(STEREO_WIDTH.id(), 150.0)?;

        let parameters = indices.sampler_parameters(&store);
        assert_eq!(parameters.playback_mode, PlaybackMode::Random);
        assert!(parameters.reverse);
        assert!(!parameters.random_octave);
        assert_eq!(parameters.slots[2].filter_type, SvfFilterType::BandPass);
        assert_eq!(parameters.slots[2].lfo_waveform, LfoWaveform::SampleAndHold);
        assert_eq!(parameters.slots[2].pitch, -7.0);
        assert_eq!(parameters.slots[1], SlotParameters::default());
        assert_eq!(indices.master(&store), (0.0, 1.5));

        store.set_value(PLAYBACK_LAYER.id(), 0.0)?;
        store.set_value(PLAYBACK_RANDOM.id(), 0.0)?;
        assert_eq!(
            indices.sampler_parameters(&store).playback_mode,
            PlaybackMode::RoundRobin
        );
        Ok(())
    }

    #[test]
    fn missing_parameters_are_rejected() {
        let store = ParameterStore::new(global_parameters()).expect("valid parameter layout");
        assert!(ParameterIndices::resolve(&store).is_err());
    }
}
