use four_cc::FourCC;

use crate::{
    effect::Effect,
    parameter::{FloatParameter, FloatParameterValue, ParameterValueUpdate},
    utils::{db_to_linear, dsp::filters::one_pole::OnePoleLowpass, sanitize},
    ClonableParameter, Error,
};

// -------------------------------------------------------------------------------------------------

/// Two cascaded one-pole low-pass stages (12 dB/octave).
#[derive(Debug, Default, Clone, Copy)]
struct CascadedLowpass {
    stages: [OnePoleLowpass; 2],
}

impl CascadedLowpass {
    #[inline]
    fn process_sample(&mut self, input: f32, coefficient: f32) -> f32 {
        let first = self.stages[0].process_sample(input, coefficient);
        self.stages[1].process_sample(first, coefficient)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct BandSplitter {
    low: CascadedLowpass,
    high: CascadedLowpass,
}

impl BandSplitter {
    /// Split into (low, mid, high) bands, which always sum up to the input.
    #[inline]
    fn split(&mut self, input: f32, low_coefficient: f32, high_coefficient: f32) -> [f32; 3] {
        let low = self.low.process_sample(input, low_coefficient);
        let high = input - self.high.process_sample(input, high_coefficient);
        [low, input - low - high, high]
    }
}

// -------------------------------------------------------------------------------------------------

/// Three band (low/mid/high) gain shaper with a per-band stereo spread and a soft limiter.
pub struct SpectralFilterEffect {
    sample_rate: u32,

    // Parameters
    low_gain: FloatParameterValue,
    mid_gain: FloatParameterValue,
    high_gain: FloatParameterValue,
    spread: FloatParameterValue,
    mix: FloatParameterValue,

    // Runtime data
    splitters: [BandSplitter; 2],
}

impl SpectralFilterEffect {
    pub const EFFECT_NAME: &str = "SpectralFilterEffect";
    pub const LOW_GAIN_ID: FourCC = FourCC(*b"sflo");
    pub const MID_GAIN_ID: FourCC = FourCC(*b"sfmd");
    pub const HIGH_GAIN_ID: FourCC = FourCC(*b"sfhi");
    pub const SPREAD_ID: FourCC = FourCC(*b"sfsp");
    pub const MIX_ID: FourCC = FourCC(*b"sfmx");

    const LOW_CROSSOVER: f32 = 300.0;
    const HIGH_CROSSOVER: f32 = 4000.0;

    pub const LOW_GAIN: FloatParameter =
        FloatParameter::new(Self::LOW_GAIN_ID, "Low", -12.0..=12.0, 0.0).with_unit("dB");
    pub const MID_GAIN: FloatParameter =
        FloatParameter::new(Self::MID_GAIN_ID, "Mid", -12.0..=12.0, 0.0).with_unit("dB");
    pub const HIGH_GAIN: FloatParameter =
        FloatParameter::new(Self::HIGH_GAIN_ID, "High", -12.0..=12.0, 0.0).with_unit("dB");
    pub const SPREAD: FloatParameter =
        FloatParameter::new(Self::SPREAD_ID, "Spread", 0.0..=1.0, 0.0);
    pub const MIX: FloatParameter = FloatParameter::new(Self::MIX_ID, "Mix", 0.0..=1.0, 1.0);

    /// Creates a new `SpectralFilterEffect` with default parameter values.
    pub fn new() -> Self {
        Self {
            sample_rate: 44100,
            low_gain: FloatParameterValue::from_description(Self::LOW_GAIN),
            mid_gain: FloatParameterValue::from_description(Self::MID_GAIN),
            high_gain: FloatParameterValue::from_description(Self::HIGH_GAIN),
            spread: FloatParameterValue::from_description(Self::SPREAD),
            mix: FloatParameterValue::from_description(Self::MIX),
            splitters: [BandSplitter::default(); 2],
        }
    }

    /// Creates a new `SpectralFilterEffect` with the given parameters. Values are clamped.
    pub fn with_parameters(low_db: f32, mid_db: f32, high_db: f32, spread: f32, mix: f32) -> Self {
        let mut filter = Self::default();
        filter.set_low_gain(low_db);
        filter.set_mid_gain(mid_db);
        filter.set_high_gain(high_db);
        filter.set_spread(spread);
        filter.set_mix(mix);
        filter
    }

    /// Gain of the band below 300 Hz in dB, clamped to `-12..=12`.
    pub fn set_low_gain(&mut self, gain_db: f32) {
        self.low_gain.set_value_clamped(gain_db);
    }

    /// Gain of the band between 300 Hz and 4 kHz in dB, clamped to `-12..=12`.
    pub fn set_mid_gain(&mut self, gain_db: f32) {
        self.mid_gain.set_value_clamped(gain_db);
    }

    /// Gain of the band above 4 kHz in dB, clamped to `-12..=12`.
    pub fn set_high_gain(&mut self, gain_db: f32) {
        self.high_gain.set_value_clamped(gain_db);
    }

    /// Stereo spread amount, clamped to `0..=1`. Narrows lows and widens mids and highs.
    pub fn set_spread(&mut self, spread: f32) {
        self.spread.set_value_clamped(spread);
    }

    /// Dry/wet mix, clamped to `0..=1`.
    pub fn set_mix(&mut self, mix: f32) {
        self.mix.set_value_clamped(mix);
    }

    #[inline]
    fn widen(left: &mut f32, right: &mut f32, side_gain: f32) {
        let mid = (*left + *right) * 0.5;
        let side = (*left - *right) * 0.5 * side_gain;
        *left = mid + side;
        *right = mid - side;
    }

    #[inline]
    fn soft_limit(x: f32) -> f32 {
        if x.abs() > 1.0 {
            x.tanh()
        } else {
            x
        }
    }
}

impl Default for SpectralFilterEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for SpectralFilterEffect {
    fn name(&self) -> &'static str {
        Self::EFFECT_NAME
    }

    fn parameters(&self) -> Vec<&dyn ClonableParameter> {
        vec![
            self.low_gain.description(),
            self.mid_gain.description(),
            self.high_gain.description(),
            self.spread.description(),
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
                "SpectralFilterEffect: invalid sample rate".to_owned(),
            ));
        }
        if channel_count != 2 {
            return Err(Error::InitializationError(
                "SpectralFilterEffect only supports stereo I/O".to_owned(),
            ));
        }
        self.sample_rate = sample_rate;
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.splitters = [BandSplitter::default(); 2];
    }

    fn process(&mut self, output: &mut [f32]) {
        let gains = [
            db_to_linear(self.low_gain.value()),
            db_to_linear(self.mid_gain.value()),
            db_to_linear(self.high_gain.value()),
        ];
        let spread = self.spread.value();
        let side_gains = [1.0 - 0.5 * spread, 1.0 + 0.3 * spread, 1.0 + spread];
        let low_coefficient = OnePoleLowpass::coefficient(self.sample_rate, Self::LOW_CROSSOVER);
        let high_coefficient = OnePoleLowpass::coefficient(self.sample_rate, Self::HIGH_CROSSOVER);
        let wet_amount = self.mix.value();
        let dry_amount = 1.0 - wet_amount;

        let [left_splitter, right_splitter] = &mut self.splitters;
        for frame in output.chunks_exact_mut(2) {
            let (dry_left, dry_right) = (frame[0], frame[1]);
            let mut left =
                left_splitter.split(sanitize(dry_left), low_coefficient, high_coefficient);
            let mut right =
                right_splitter.split(sanitize(dry_right), low_coefficient, high_coefficient);

            let (mut wet_left, mut wet_right) = (0.0, 0.0);
            for band in 0..3 {
                left[band] *= gains[band];
                right[band] *= gains[band];
                if spread > 0.0 {
                    Self::widen(&mut left[band], &mut right[band], side_gains[band]);
                }
                wet_left += left[band];
                wet_right += right[band];
            }

            let mixed_left = dry_left * dry_amount + Self::soft_limit(wet_left) * wet_amount;
            let mixed_right = dry_right * dry_amount + Self::soft_limit(wet_right) * wet_amount;
            frame[0] = if mixed_left.is_finite() { mixed_left } else { 0.0 };
            frame[1] = if mixed_right.is_finite() { mixed_right } else { 0.0 };
        }
    }

    fn process_parameter_update(
        &mut self,
        id: FourCC,
        value: &ParameterValueUpdate,
    ) -> Result<(), Error> {
        match id {
            Self::LOW_GAIN_ID => self.low_gain.apply_update(value),
            Self::MID_GAIN_ID => self.mid_gain.apply_update(value),
            Self::HIGH_GAIN_ID => self.high_gain.apply_update(value),
            Self::SPREAD_ID => self.spread.apply_update(value),
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
