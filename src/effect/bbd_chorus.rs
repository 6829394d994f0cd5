use four_cc::FourCC;

use crate::{
    effect::Effect,
    parameter::{FloatParameter, FloatParameterValue, ParameterScaling, ParameterValueUpdate},
    utils::{
        dsp::{
            companding::Compander,
            delay::DelayLine,
            filters::one_pole::OnePoleLowpass,
            lfo::{Lfo, LfoWaveform},
        },
        sanitize,
    },
    ClonableParameter, Error,
};

// -------------------------------------------------------------------------------------------------

/// Per channel state of the [`BbdChorusEffect`].
#[derive(Debug, Clone)]
struct ChorusChannel {
    lfo: Lfo,
    delay_line: DelayLine,
    bbd_filter: OnePoleLowpass,
    tone_filter: OnePoleLowpass,
}

impl ChorusChannel {
    fn new(sample_rate: u32, rate: f32, phase: f64) -> Self {
        let mut lfo = Lfo::with_seed(sample_rate, rate as f64, LfoWaveform::Sine, 0);
        lfo.set_phase(phase);
        Self {
            lfo,
            delay_line: DelayLine::new(sample_rate, BbdChorusEffect::MAX_DELAY_MS * 0.001),
            bbd_filter: OnePoleLowpass::new(),
            tone_filter: OnePoleLowpass::new(),
        }
    }

    fn reset(&mut self, phase: f64) {
        self.lfo.reset();
        self.lfo.set_phase(phase);
        self.delay_line.flush();
        self.bbd_filter.reset();
        self.tone_filter.reset();
    }
}

// -------------------------------------------------------------------------------------------------

/// A stereo bucket-brigade style chorus: two companded, modulated short delay lines with
/// quadrature LFOs, anti-aliasing and tone filters. No feedback.
///
/// The left and right channels never share state.
pub struct BbdChorusEffect {
    sample_rate: u32,

    // Parameters
    rate: FloatParameterValue,
    depth: FloatParameterValue,
    tone: FloatParameterValue,
    mix: FloatParameterValue,

    // Runtime data
    compander: Compander,
    channels: [ChorusChannel; 2],
}

impl BbdChorusEffect {
    pub const EFFECT_NAME: &str = "BbdChorusEffect";
    pub const RATE_ID: FourCC = FourCC(*b"chrt");
    pub const DEPTH_ID: FourCC = FourCC(*b"chdp");
    pub const TONE_ID: FourCC = FourCC(*b"chtn");
    pub const MIX_ID: FourCC = FourCC(*b"chmx");

    const BASE_DELAY_MS: f32 = 7.0;
    const MAX_MODULATION_MS: f32 = 5.0;
    const MIN_DELAY_MS: f32 = 1.0;
    const MAX_DELAY_MS: f32 = 50.0;
    const BBD_STAGES: f32 = 512.0;
    const MIN_BBD_CUTOFF: f32 = 2000.0;
    const MAX_BBD_CUTOFF: f32 = 20000.0;
    const COMPANDER_MU: f32 = 8.0;
    const RIGHT_PHASE_OFFSET: f64 = 0.25;

    pub const RATE: FloatParameter = FloatParameter::new(Self::RATE_ID, "Rate", 0.01..=10.0, 0.5)
        .with_unit("Hz")
        .with_scaling(ParameterScaling::Exponential(2.0));
    pub const DEPTH: FloatParameter = FloatParameter::new(Self::DEPTH_ID, "Depth", 0.0..=1.0, 0.5);
    pub const TONE: FloatParameter = FloatParameter::new(Self::TONE_ID, "Tone", 0.0..=1.0, 0.7);
    pub const MIX: FloatParameter = FloatParameter::new(Self::MIX_ID, "Mix", 0.0..=1.0, 0.3);

    /// Creates a new `BbdChorusEffect` with default parameter values.
    pub fn new() -> Self {
        let sample_rate = 44100;
        let rate = FloatParameterValue::from_description(Self::RATE);
        let channels = [
            ChorusChannel::new(sample_rate, rate.value(), 0.0),
            ChorusChannel::new(sample_rate, rate.value(), Self::RIGHT_PHASE_OFFSET),
        ];
        Self {
            sample_rate,
            rate,
            depth: FloatParameterValue::from_description(Self::DEPTH),
            tone: FloatParameterValue::from_description(Self::TONE),
            mix: FloatParameterValue::from_description(Self::MIX),
            compander: Compander::new(Self::COMPANDER_MU),
            channels,
        }
    }

    /// Creates a new `BbdChorusEffect` with the given parameters. Values are clamped.
    pub fn with_parameters(rate: f32, depth: f32, tone: f32, mix: f32) -> Self {
        let mut chorus = Self::default();
        chorus.set_rate(rate);
        chorus.set_depth(depth);
        chorus.set_tone(tone);
        chorus.set_mix(mix);
        chorus
    }

    /// LFO rate in Hz, clamped to `0.01..=10`.
    pub fn set_rate(&mut self, rate: f32) {
        self.rate.set_value_clamped(rate);
        self.apply_rate();
    }

    /// Modulation depth, clamped to `0..=1`. Full depth modulates by ±5 ms around 7 ms.
    pub fn set_depth(&mut self, depth: f32) {
        self.depth.set_value_clamped(depth);
    }

    /// Tone, clamped to `0..=1`. Maps to a low-pass cutoff of 1 kHz to 16 kHz.
    pub fn set_tone(&mut self, tone: f32) {
        self.tone.set_value_clamped(tone);
    }

    /// Dry/wet mix, clamped to `0..=1`.
    pub fn set_mix(&mut self, mix: f32) {
        self.mix.set_value_clamped(mix);
    }

    fn apply_rate(&mut self) {
        for channel in &mut self.channels {
            channel.lfo.set_rate(self.rate.value() as f64);
        }
    }

    fn bbd_cutoff(delay_ms: f32) -> f32 {
        let clock_rate = Self::BBD_STAGES / (2.0 * delay_ms * 0.001);
        (clock_rate * 0.5).clamp(Self::MIN_BBD_CUTOFF, Self::MAX_BBD_CUTOFF)
    }

    #[inline]
    fn process_channel_sample(
        channel: &mut ChorusChannel,
        compander: &Compander,
        sample_rate: u32,
        depth: f32,
        tone_coefficient: f32,
        input: f32,
    ) -> f32 {
        let lfo = channel.lfo.next_value() as f32;
        let delay_ms = (Self::BASE_DELAY_MS + lfo * Self::MAX_MODULATION_MS * depth)
            .clamp(Self::MIN_DELAY_MS, Self::MAX_DELAY_MS);
        let delay_samples = delay_ms * 0.001 * sample_rate as f32;

        channel.delay_line.write(compander.compress(sanitize(input)));
        let delayed = channel.delay_line.read_interpolated(delay_samples);

        let bbd_coefficient = OnePoleLowpass::coefficient(sample_rate, Self::bbd_cutoff(delay_ms));
        let filtered = channel.bbd_filter.process_sample(delayed, bbd_coefficient);
        let toned = channel.tone_filter.process_sample(filtered, tone_coefficient);
        compander.expand(toned)
    }
}

impl Default for BbdChorusEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for BbdChorusEffect {
    fn name(&self) -> &'static str {
        Self::EFFECT_NAME
    }

    fn parameters(&self) -> Vec<&dyn ClonableParameter> {
        vec![
            self.rate.description(),
            self.depth.description(),
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
                "BbdChorusEffect: invalid sample rate".to_owned(),
            ));
        }
        if channel_count != 2 {
            return Err(Error::InitializationError(
                "BbdChorusEffect only supports stereo I/O".to_owned(),
            ));
        }
        self.sample_rate = sample_rate;
        self.channels = [
            ChorusChannel::new(sample_rate, self.rate.value(), 0.0),
            ChorusChannel::new(sample_rate, self.rate.value(), Self::RIGHT_PHASE_OFFSET),
        ];
        Ok(())
    }

    fn reset(&mut self) {
        let [left, right] = &mut self.channels;
        left.reset(0.0);
        right.reset(Self::RIGHT_PHASE_OFFSET);
    }

    fn process(&mut self, output: &mut [f32]) {
        let tone_cutoff = 1000.0 + self.tone.value() * 15000.0;
        let tone_coefficient = OnePoleLowpass::coefficient(self.sample_rate, tone_cutoff);
        let depth = self.depth.value();
        let wet_amount = self.mix.value();
        let dry_amount = 1.0 - wet_amount;

        for frame in output.chunks_exact_mut(2) {
            for (sample, channel) in frame.iter_mut().zip(self.channels.iter_mut()) {
                let wet = Self::process_channel_sample(
                    channel,
                    &self.compander,
                    self.sample_rate,
                    depth,
                    tone_coefficient,
                    *sample,
                );
                let mixed = *sample * dry_amount + wet * wet_amount;
                if mixed.is_finite() {
                    *sample = mixed;
                }
            }
        }
    }

    fn process_tail(&self) -> Option<usize> {
        Some((Self::MAX_DELAY_MS * 0.001 * self.sample_rate as f32).ceil() as usize)
    }

    fn process_parameter_update(
        &mut self,
        id: FourCC,
        value: &ParameterValueUpdate,
    ) -> Result<(), Error> {
        match id {
            Self::RATE_ID => {
                self.rate.apply_update(value);
                self.apply_rate();
            }
            Self::DEPTH_ID => self.depth.apply_update(value),
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

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 48000;

    #[test]
    fn channels_are_independent() -> Result<(), Box<dyn std::error::Error>> {
        let mut chorus = BbdChorusEffect::with_parameters(2.0, 1.0, 0.7, 1.0);
        chorus.initialize(SAMPLE_RATE, 2, 1024)?;
        let mut buffer = (0..4096)
            .flat_map(|i| [(i as f32 * 0.05).sin(), 0.0])
            .collect::<Vec<_>>();
        chorus.process(&mut buffer);
        let (left, right): (Vec<f32>, Vec<f32>) =
            buffer.chunks_exact(2).map(|f| (f[0], f[1])).unzip();
        assert!(right.iter().all(|v| *v == 0.0));
        assert!(left.iter().any(|v| v.abs() > 0.1));
        Ok(())
    }

    #[test]
    fn static_delay_without_depth() -> Result<(), Box<dyn std::error::Error>> {
        let mut chorus = BbdChorusEffect::with_parameters(1.0, 0.0, 1.0, 1.0);
        chorus.initialize(SAMPLE_RATE, 2, 1024)?;
        let mut buffer = vec![0.0; 2 * 2048];
        buffer[0] = 1.0;
        buffer[1] = 1.0;
        chorus.process(&mut buffer);
        let left = buffer.chunks_exact(2).map(|f| f[0]).collect::<Vec<_>>();
        let peak_index = left
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(index, _)| index)
            .unwrap_or_default();
        // 7 ms at 48 kHz, plus the filter's group delay
        let expected = (0.007 * SAMPLE_RATE as f32) as usize;
        assert!(peak_index + 1 >= expected && peak_index <= expected + 4);
        assert!(left[..expected - 2].iter().all(|v| *v == 0.0));
        // both channels see the same, unmodulated delay
        assert!(buffer
            .chunks_exact(2)
            .all(|f| (f[0] - f[1]).abs() < 1e-6));
        Ok(())
    }

    #[test]
    fn rejects_mono_io() {
        let mut chorus = BbdChorusEffect::new();
        assert!(chorus.initialize(SAMPLE_RATE, 1, 1024).is_err());
        assert!(chorus.initialize(SAMPLE_RATE, 2, 1024).is_ok());
    }

    #[test]
    fn quadrature_lfos() -> Result<(), Box<dyn std::error::Error>> {
        let mut chorus = BbdChorusEffect::new();
        chorus.initialize(SAMPLE_RATE, 2, 1024)?;
        assert_eq!(chorus.channels[0].lfo.phase(), 0.0);
        assert_eq!(chorus.channels[1].lfo.phase(), 0.25);
        Ok(())
    }
}
