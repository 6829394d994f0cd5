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

/// A mono bucket-brigade style delay with companding, clock-rate dependent anti-aliasing, tone
/// control, saturated feedback and delay time modulation.
///
/// Both input channels are summed to mono before entering the delay line. The delayed signal is
/// mixed into all output channels.
pub struct BbdDelayEffect {
    sample_rate: u32,
    channel_count: usize,

    // Parameters
    delay_time: FloatParameterValue,
    feedback: FloatParameterValue,
    mod_depth: FloatParameterValue,
    mod_rate: FloatParameterValue,
    tone: FloatParameterValue,
    mix: FloatParameterValue,

    // Runtime data
    compander: Compander,
    lfo: Lfo,
    delay_line: DelayLine,
    bbd_filter: OnePoleLowpass,
    tone_filter: OnePoleLowpass,
}

impl BbdDelayEffect {
    pub const EFFECT_NAME: &str = "BbdDelayEffect";
    pub const TIME_ID: FourCC = FourCC(*b"dltm");
    pub const FEEDBACK_ID: FourCC = FourCC(*b"dlfb");
    pub const MOD_DEPTH_ID: FourCC = FourCC(*b"dlmd");
    pub const MOD_RATE_ID: FourCC = FourCC(*b"dlmr");
    pub const TONE_ID: FourCC = FourCC(*b"dltn");
    pub const MIX_ID: FourCC = FourCC(*b"dlmx");

    pub const MIN_DELAY_MS: f32 = 1.0;
    pub const MAX_DELAY_MS: f32 = 1000.0;

    const MAX_MODULATION_MS: f32 = 2.0;
    const BBD_STAGES: f32 = 1024.0;
    const MIN_BBD_CUTOFF: f32 = 200.0;
    const MAX_BBD_CUTOFF: f32 = 20000.0;
    const COMPANDER_MU: f32 = 10.0;
    const MAX_LINE_LEVEL: f32 = 4.0;
    const FEEDBACK_DRIVE: f32 = 1.5;

    pub const TIME: FloatParameter = FloatParameter::new(
        Self::TIME_ID,
        "Delay Time",
        Self::MIN_DELAY_MS..=Self::MAX_DELAY_MS,
        213.0,
    )
    .with_unit("ms")
    .with_scaling(ParameterScaling::Exponential(2.0));
    pub const FEEDBACK: FloatParameter =
        FloatParameter::new(Self::FEEDBACK_ID, "Feedback", 0.0..=0.99, 0.5);
    pub const MOD_DEPTH: FloatParameter =
        FloatParameter::new(Self::MOD_DEPTH_ID, "Mod Depth", 0.0..=1.0, 0.0);
    pub const MOD_RATE: FloatParameter =
        FloatParameter::new(Self::MOD_RATE_ID, "Mod Rate", 0.01..=10.0, 1.0)
            .with_unit("Hz")
            .with_scaling(ParameterScaling::Exponential(2.0));
    pub const TONE: FloatParameter = FloatParameter::new(Self::TONE_ID, "Tone", 0.0..=1.0, 0.5);
    pub const MIX: FloatParameter = FloatParameter::new(Self::MIX_ID, "Mix", 0.0..=1.0, 0.3);

    /// Creates a new `BbdDelayEffect` with default parameter values.
    pub fn new() -> Self {
        let to_string_percent = |v: f32| format!("{:.1}", v * 100.0);
        let from_string_percent = |v: &str| v.parse::<f32>().map(|f| f / 100.0).ok();
        Self {
            sample_rate: 44100,
            channel_count: 2,

            delay_time: FloatParameterValue::from_description(Self::TIME),
            feedback: FloatParameterValue::from_description(
                Self::FEEDBACK
                    .with_unit("%")
                    .with_display(to_string_percent, from_string_percent),
            ),
            mod_depth: FloatParameterValue::from_description(
                Self::MOD_DEPTH
                    .with_unit("%")
                    .with_display(to_string_percent, from_string_percent),
            ),
            mod_rate: FloatParameterValue::from_description(Self::MOD_RATE),
            tone: FloatParameterValue::from_description(Self::TONE),
            mix: FloatParameterValue::from_description(
                Self::MIX
                    .with_unit("%")
                    .with_display(to_string_percent, from_string_percent),
            ),

            compander: Compander::new(Self::COMPANDER_MU),
            lfo: Lfo::with_seed(44100, 1.0, LfoWaveform::Sine, 0),
            delay_line: DelayLine::default(),
            bbd_filter: OnePoleLowpass::new(),
            tone_filter: OnePoleLowpass::new(),
        }
    }

    /// Creates a new `BbdDelayEffect` with the given parameters. Values are clamped.
    pub fn with_parameters(
        delay_time_ms: f32,
        feedback: f32,
        mod_depth: f32,
        mod_rate: f32,
        tone: f32,
        mix: f32,
    ) -> Self {
        let mut delay = Self::default();
        delay.set_delay_time(delay_time_ms);
        delay.set_feedback(feedback);
        delay.set_mod_depth(mod_depth);
        delay.set_mod_rate(mod_rate);
        delay.set_tone(tone);
        delay.set_mix(mix);
        delay
    }

    /// Delay time in milliseconds, clamped to `1..=1000`.
    pub fn set_delay_time(&mut self, delay_time_ms: f32) {
        self.delay_time.set_value_clamped(delay_time_ms);
    }

    /// Feedback amount, clamped to `0..=0.99`.
    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback.set_value_clamped(feedback);
    }

    /// Delay time modulation depth, clamped to `0..=1`. Full depth modulates by ±2 ms.
    pub fn set_mod_depth(&mut self, depth: f32) {
        self.mod_depth.set_value_clamped(depth);
    }

    /// Delay time modulation rate in Hz, clamped to `0.01..=10`.
    pub fn set_mod_rate(&mut self, rate: f32) {
        self.mod_rate.set_value_clamped(rate);
        self.lfo.set_rate(self.mod_rate.value() as f64);
    }

    /// Tone, clamped to `0..=1`. Maps to a low-pass cutoff of 200 Hz to 10.2 kHz.
    pub fn set_tone(&mut self, tone: f32) {
        self.tone.set_value_clamped(tone);
    }

    /// Dry/wet mix, clamped to `0..=1`.
    pub fn set_mix(&mut self, mix: f32) {
        self.mix.set_value_clamped(mix);
    }

    fn tone_cutoff(&self) -> f32 {
        200.0 + self.tone.value() * 10000.0
    }

    /// Anti-aliasing cutoff of a bucket brigade line which is clocked for the given delay.
    fn bbd_cutoff(delay_ms: f32) -> f32 {
        let clock_rate = Self::BBD_STAGES / (2.0 * delay_ms * 0.001);
        (clock_rate * 0.5).clamp(Self::MIN_BBD_CUTOFF, Self::MAX_BBD_CUTOFF)
    }

    fn soft_saturate(x: f32) -> f32 {
        (Self::FEEDBACK_DRIVE * x).tanh() / Self::FEEDBACK_DRIVE.tanh()
    }

    #[inline]
    fn process_sample(&mut self, input: f32, tone_coefficient: f32) -> f32 {
        let input = sanitize(input);
        let compressed_input = self.compander.compress(input);

        let modulation = self.lfo.next_value() as f32
            * self.mod_depth.value()
            * Self::MAX_MODULATION_MS;
        let delay_ms =
            (self.delay_time.value() + modulation).clamp(Self::MIN_DELAY_MS, Self::MAX_DELAY_MS);
        let delay_samples = delay_ms * 0.001 * self.sample_rate as f32;

        let delayed = self.delay_line.read_interpolated(delay_samples);
        let bbd_coefficient =
            OnePoleLowpass::coefficient(self.sample_rate, Self::bbd_cutoff(delay_ms));
        let filtered = self.bbd_filter.process_sample(delayed, bbd_coefficient);
        let toned = self.tone_filter.process_sample(filtered, tone_coefficient);
        let wet = self.compander.expand(toned);

        let feedback = Self::soft_saturate(wet * self.feedback.value());
        let line_input = sanitize(compressed_input + self.compander.compress(feedback))
            .clamp(-Self::MAX_LINE_LEVEL, Self::MAX_LINE_LEVEL);
        self.delay_line.write(line_input);

        wet
    }
}

impl Default for BbdDelayEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for BbdDelayEffect {
    fn name(&self) -> &'static str {
        Self::EFFECT_NAME
    }

    fn parameters(&self) -> Vec<&dyn ClonableParameter> {
        vec![
            self.delay_time.description(),
            self.feedback.description(),
            self.mod_depth.description(),
            self.mod_rate.description(),
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
                "BbdDelayEffect: invalid sample rate".to_owned(),
            ));
        }
        if !(1..=2).contains(&channel_count) {
            return Err(Error::InitializationError(
                "BbdDelayEffect only supports mono or stereo I/O".to_owned(),
            ));
        }
        self.sample_rate = sample_rate;
        self.channel_count = channel_count;
        self.delay_line = DelayLine::new(
            sample_rate,
            (Self::MAX_DELAY_MS + Self::MAX_MODULATION_MS) * 0.001,
        );
        self.lfo = Lfo::with_seed(
            sample_rate,
            self.mod_rate.value() as f64,
            LfoWaveform::Sine,
            0,
        );
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.delay_line.flush();
        self.bbd_filter.reset();
        self.tone_filter.reset();
        self.lfo.reset();
    }

    fn process(&mut self, output: &mut [f32]) {
        let tone_coefficient = OnePoleLowpass::coefficient(self.sample_rate, self.tone_cutoff());
        let wet_amount = self.mix.value();
        let dry_amount = 1.0 - wet_amount;
        let channel_count = self.channel_count;
        let channel_gain = 1.0 / channel_count as f32;

        for frame in output.chunks_exact_mut(channel_count) {
            let mono_input = frame.iter().sum::<f32>() * channel_gain;
            let wet = self.process_sample(mono_input, tone_coefficient);
            for sample in frame.iter_mut() {
                let mixed = *sample * dry_amount + wet * wet_amount;
                if mixed.is_finite() {
                    *sample = mixed;
                }
            }
        }
    }

    fn process_tail(&self) -> Option<usize> {
        let delay_frames =
            (self.delay_time.value() * 0.001 * self.sample_rate as f32).ceil() as usize;
        let feedback = self.feedback.value();
        // number of echoes until the feedback loop decayed by ~60 dB
        let repeats = if feedback > 0.0 {
            ((0.001f32).ln() / feedback.ln()).ceil() as usize
        } else {
            1
        };
        Some(delay_frames * repeats.max(1))
    }

    fn process_parameter_update(
        &mut self,
        id: FourCC,
        value: &ParameterValueUpdate,
    ) -> Result<(), Error> {
        match id {
            Self::TIME_ID => self.delay_time.apply_update(value),
            Self::FEEDBACK_ID => self.feedback.apply_update(value),
            Self::MOD_DEPTH_ID => self.mod_depth.apply_update(value),
            Self::MOD_RATE_ID => {
                self.mod_rate.apply_update(value);
                self.lfo.set_rate(self.mod_rate.value() as f64);
            }
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

    fn impulse_response(delay: &mut BbdDelayEffect, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; frames * 2];
        buffer[0] = 0.5;
        buffer[1] = 0.5;
        delay.process(&mut buffer);
        buffer.chunks_exact(2).map(|frame| frame[0]).collect()
    }

    fn window_energy(signal: &[f32], center: usize, half_width: usize) -> f32 {
        signal[center - half_width..center + half_width]
            .iter()
            .map(|v| v * v)
            .sum()
    }

    #[test]
    fn single_echo_without_feedback() -> Result<(), Box<dyn std::error::Error>> {
        let mut delay = BbdDelayEffect::with_parameters(10.0, 0.0, 0.0, 1.0, 1.0, 1.0);
        delay.initialize(SAMPLE_RATE, 2, 1024)?;

        let delay_frames = 480;
        let output = impulse_response(&mut delay, delay_frames * 4);
        let total: f32 = output.iter().map(|v| v * v).sum();
        let echo = window_energy(&output, delay_frames + 20, 40);
        assert!(echo > 0.0);
        // all energy is in the first echo: no repeats
        assert!(echo / total > 0.999);
        assert!(output[..delay_frames - 1].iter().all(|v| *v == 0.0));
        Ok(())
    }

    #[test]
    fn feedback_echoes_decay() -> Result<(), Box<dyn std::error::Error>> {
        let mut delay = BbdDelayEffect::with_parameters(10.0, 0.5, 0.0, 1.0, 0.5, 1.0);
        delay.initialize(SAMPLE_RATE, 2, 1024)?;

        let delay_frames = 480;
        let output = impulse_response(&mut delay, delay_frames * 7);
        let energies = (1..=5)
            .map(|echo| window_energy(&output, echo * delay_frames, delay_frames / 2))
            .collect::<Vec<_>>();
        assert!(energies[0] > 0.0);
        for pair in energies.windows(2) {
            assert!(pair[1] < pair[0], "echo energies not decaying: {energies:?}");
        }
        Ok(())
    }

    #[test]
    fn stays_finite_with_max_feedback() -> Result<(), Box<dyn std::error::Error>> {
        let mut delay = BbdDelayEffect::with_parameters(1.0, 0.99, 1.0, 10.0, 1.0, 1.0);
        delay.initialize(SAMPLE_RATE, 2, 1024)?;
        let mut buffer = (0..SAMPLE_RATE as usize * 2)
            .map(|i| if (i / 64) % 2 == 0 { 1.0 } else { -1.0 })
            .collect::<Vec<f32>>();
        delay.process(&mut buffer);
        // the line level is bounded, so the expanded wet signal is bounded as well
        assert!(buffer.iter().all(|v| v.is_finite() && v.abs() < 16.0));
        Ok(())
    }

    #[test]
    fn dry_signal_passes_with_zero_mix() -> Result<(), Box<dyn std::error::Error>> {
        let mut delay = BbdDelayEffect::with_parameters(100.0, 0.8, 0.5, 2.0, 0.5, 0.0);
        delay.initialize(SAMPLE_RATE, 2, 1024)?;
        let input = (0..2048).map(|i| (i as f32 * 0.01).sin()).collect::<Vec<_>>();
        let mut buffer = input.clone();
        delay.process(&mut buffer);
        assert_eq!(buffer, input);
        Ok(())
    }

    #[test]
    fn setters_clamp() {
        let mut delay = BbdDelayEffect::new();
        delay.set_delay_time(5000.0);
        delay.set_feedback(2.0);
        delay.set_mix(-1.0);
        assert_eq!(delay.delay_time.value(), BbdDelayEffect::MAX_DELAY_MS);
        assert_eq!(delay.feedback.value(), 0.99);
        assert_eq!(delay.mix.value(), 0.0);
        assert!(delay
            .process_parameter_update(FourCC(*b"????"), &ParameterValueUpdate::Raw(1.0))
            .is_err());
        assert!(delay
            .process_parameter_update(BbdDelayEffect::TIME_ID, &ParameterValueUpdate::Raw(0.0))
            .is_ok());
        assert_eq!(delay.delay_time.value(), BbdDelayEffect::MIN_DELAY_MS);
    }
}
