//! Shared helpers for gain conversions, buffers and DSP building blocks.

pub mod buffer;
pub mod dsp;

// -------------------------------------------------------------------------------------------------

pub(crate) const MINUS_INF_IN_DB: f32 = -200.0f32;

const DB_TO_LIN_FACTOR: f32 = std::f32::consts::LN_10 / 20.0f32;

// -------------------------------------------------------------------------------------------------

/// Convert a decibel value to a linear gain: `10^(db/20)`.
pub fn db_to_linear(value: f32) -> f32 {
    if value == 0.0f32 {
        return 1.0f32; // avoid rounding errors at exactly 0 dB
    } else if value > MINUS_INF_IN_DB {
        return (value * DB_TO_LIN_FACTOR).exp();
    }
    0.0f32
}

/// Convert a semitone offset to a playback speed ratio.
#[inline]
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    2.0f64.powf(semitones / 12.0)
}

// -------------------------------------------------------------------------------------------------

/// Replace NaN and infinite values with zero.
#[inline(always)]
pub fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Sanitize and apply a `tanh` soft clip to values beyond the unity range.
#[inline(always)]
pub fn sanitize_and_soft_clip(value: f32) -> f32 {
    let value = sanitize(value);
    if value.abs() > 1.0 {
        value.tanh()
    } else {
        value
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_conversion() {
        assert_eq!(db_to_linear(MINUS_INF_IN_DB), 0.0);
        assert_eq!(db_to_linear(0.0), 1.0);
        assert!((db_to_linear(20.0) - 10.0).abs() < 0.0001);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 0.0001);
        assert!((db_to_linear(-6.0) - 0.501_187).abs() < 0.0001);
    }

    #[test]
    fn semitone_ratios() {
        assert_eq!(semitones_to_ratio(0.0), 1.0);
        assert!((semitones_to_ratio(12.0) - 2.0).abs() < 1e-12);
        assert!((semitones_to_ratio(-12.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn soft_clip() {
        assert_eq!(sanitize_and_soft_clip(f32::NAN), 0.0);
        assert_eq!(sanitize_and_soft_clip(f32::INFINITY), 0.0);
        assert_eq!(sanitize_and_soft_clip(0.5), 0.5);
        let clipped = sanitize_and_soft_clip(3.0);
        assert!(clipped < 1.0 && clipped > 0.99);
        let clipped = sanitize_and_soft_clip(-3.0);
        assert!(clipped > -1.0 && clipped < -0.99);
    }
}
