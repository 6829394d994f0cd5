use four_cc::FourCC;

use crate::{
    effect::Effect,
    parameter::{FloatParameter, FloatParameterValue, ParameterValueUpdate},
    utils::{dsp::filters::one_pole::OnePoleLowpass, sanitize},
    ClonableParameter, Error,
};

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
struct TapeChannel {
    tone_filters: [OnePoleLowpass; 2],
    dc_filter: OnePoleLowpass,
    bass_filter: OnePoleLowpass,
}

impl TapeChannel {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TapeCoefficients {
    input_gain: f32,
    compression_ratio: Option<f32>,
    tone: f32,
    dc: f32,
    bass: f32,
    bass_amount: f32,
    output_gain: f32,
}

// -------------------------------------------------------------------------------------------------

/// Tape style saturation: drive, soft-knee compression, asymmetric saturation, tone roll-off,
/// DC removal and a subtle low frequency boost.
pub struct TapeSaturationEffect {
    sample_rate: u32,
    channel_count: usize,

    // Parameters
    drive: FloatParameterValue,
    compression: FloatParameterValue,
    tone: FloatParameterValue,
    mix: FloatParameterValue,

    // Runtime data
    channels: [TapeChannel; 2],
}

impl TapeSaturationEffect {
    pub const EFFECT_NAME: &str = "TapeSaturationEffect";
    pub const DRIVE_ID: FourCC = FourCC(*b"tpdr");
    pub const COMPRESSION_ID: FourCC = FourCC(*b"tpcp");
    pub const TONE_ID: FourCC = FourCC(*b"tptn");
    pub const MIX_ID: FourCC = FourCC(*b"tpmx");

    const COMPRESSION_THRESHOLD: f32 = 0.5;
    const DC_CUTOFF: f32 = 30.0;
    const BASS_CUTOFF: f32 = 100.0;

    pub const DRIVE: FloatParameter = FloatParameter::new(Self::DRIVE_ID, "Drive", 0.0..=1.0, 0.3);
    pub const COMPRESSION: FloatParameter =
        FloatParameter::new(Self::COMPRESSION_ID, "Compression", 0.0..=1.0, 0.3);
    pub const TONE: FloatParameter = FloatParameter::new(Self::TONE_ID, "Tone", 0.0..=1.0, 0.7);
    pub const MIX: FloatParameter = FloatParameter::new(Self::MIX_ID, "Mix", 0.0..=1.0, 0.5);

    /// Creates a new `TapeSaturationEffect` with default parameter values.
    pub fn new() -> Self {
        Self {
            sample_rate: 44100,
            channel_count: 2,
            drive: FloatParameterValue::from_description(Self::DRIVE),
            compression: FloatParameterValue::from_description(Self::COMPRESSION),
            tone: FloatParameterValue::from_description(Self::TONE),
            mix: FloatParameterValue::from_description(Self::MIX),
            channels: [TapeChannel::default(); 2],
        }
    }

    /// Creates a new `TapeSaturationEffect` with the given parameters. Values are clamped.
    pub fn with_parameters(drive: f32, compression: f32, tone: f32, mix: f32) -> Self {
        let mut tape = Self::default();
        tape.set_drive(drive);
        tape.set_compression(compression);
        tape.set_tone(tone);
        tape.set_mix(mix);
        tape
    }

    /// Drive, clamped to `0..=1`. Maps to an input gain of 1 to 10.
    pub fn set_drive(&mut self, drive: f32) {
        self.drive.set_value_clamped(drive);
    }

    /// Compression amount, clamped to `0..=1`. Maps to a ratio of 1:1 to 4:1 above 0.5.
    pub fn set_compression(&mut self, compression: f32) {
        self.compression.set_value_clamped(compression);
    }

    /// Tone, clamped to `0..=1`. Maps to a low-pass cutoff of 2 kHz to 18 kHz.
    pub fn set_tone(&mut self, tone: f32) {
        self.tone.set_value_clamped(tone);
    }

    /// Dry/wet mix, clamped to `0..=1`.
    pub fn set_mix(&mut self, mix: f32) {
        self.mix.set_value_clamped(mix);
    }

    fn coefficients(&self) -> TapeCoefficients {
        let drive = self.drive.value();
        let compression = self.compression.value();
        let tone_cutoff = 2000.0 + 16000.0 * self.tone.value();
        TapeCoefficients {
            input_gain: 1.0 + 9.0 * drive,
            compression_ratio: (compression > 0.0).then_some(1.0 + 3.0 * compression),
            tone: OnePoleLowpass::coefficient(self.sample_rate, tone_cutoff),
            dc: OnePoleLowpass::coefficient(self.sample_rate, Self::DC_CUTOFF),
            bass: OnePoleLowpass::coefficient(self.sample_rate, Self::BASS_CUTOFF),
            bass_amount: 0.15 * drive,
            output_gain: 1.0 / (1.0 + 2.0 * drive),
        }
    }

    /// Asymmetric tape curve: positive half-waves saturate softer than negative ones.
    #[inline]
    fn saturate(x: f32) -> f32 {
        if x >= 0.0 {
            (1.2 * x).tanh()
        } else {
            -0.95 * (1.5 * x.abs()).tanh()
        }
    }

    #[inline]
    fn compress(x: f32, ratio: f32) -> f32 {
        let level = x.abs();
        if level > Self::COMPRESSION_THRESHOLD {
            let compressed =
                Self::COMPRESSION_THRESHOLD + (level - Self::COMPRESSION_THRESHOLD) / ratio;
            compressed.copysign(x)
        } else {
            x
        }
    }

    #[inline]
    fn process_channel_sample(
        channel: &mut TapeChannel,
        coefficients: &TapeCoefficients,
        input: f32,
    ) -> f32 {
        let mut x = sanitize(input) * coefficients.input_gain;
        if let Some(ratio) = coefficients.compression_ratio {
            x = Self::compress(x, ratio);
        }
        x = Self::saturate(x);
        for filter in &mut channel.tone_filters {
            x = filter.process_sample(x, coefficients.tone);
        }
        let high_passed = x - channel.dc_filter.process_sample(x, coefficients.dc);
        let bass = channel
            .bass_filter
            .process_sample(high_passed, coefficients.bass);
        (high_passed + bass * coefficients.bass_amount) * coefficients.output_gain
    }
}

impl Default for TapeSaturationEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for TapeSaturationEffect {
    fn name(&self) -> &'static str {
        Self::EFFECT_NAME
    }

    fn parameters(&self) -> Vec<&dyn ClonableParameter> {
        vec![
            self.drive.description(),
            self.compression.description(),
            self.tone.description(),
            self.mix.description(),
        ]
    }

    fn initialize(
        &mut self,
        sample_rate: u32,
        channel_count: usize,
        _max_frames: usize,
    ) -> Result<(), Error> {
        if sample_rate == 0 {
            return Err(Error::InitializationError(
                "TapeSaturationEffect: invalid sample rate".to_owned(),
            ));
        }
        if !(1..=2).contains(&channel_count) {
            return Err(Error::InitializationError(
                "TapeSaturationEffect only supports mono or stereo I/O".to_owned(),
            ));
        }
        self.sample_rate = sample_rate;
        self.channel_count = channel_count;
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
    }

    fn process(&mut self, output: &mut [f32]) {
        let coefficients = self.coefficients();
        let wet_amount = self.mix.value();
        let dry_amount = 1.0 - wet_amount;

        for frame in output.chunks_exact_mut(self.channel_count) {
            for (sample, channel) in frame.iter_mut().zip(self.channels.iter_mut()) {
                let wet = Self::process_channel_sample(channel, &coefficients, *sample);
                let mixed = *sample * dry_amount + wet * wet_amount;
                if mixed.is_finite() {
                    *sample = mixed;
                }
            }
        }
    }

    fn process_parameter_update(
        &mut self,
        id: FourCC,
        value: &ParameterValueUpdate,
    ) -> Result<(), Error> {
        match id {
            Self::DRIVE_ID => self.drive.apply_update(value),
            Self::COMPRESSION_ID => self.compression.apply_update(value),
            Self::TONE_ID => self.tone.apply_update(value),
            Self::MIX_ID => self.mix.apply_update(value),
            _ => {
                return Err(Error::ParameterError(format!(
                    "Unknown parameter: '{id}' for effect '{}'",
                    self.name()
                )))
            }
        };
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
