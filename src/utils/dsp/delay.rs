//! Delay buffers to delay signals with fractional delay times.

use assume::assume;

// -------------------------------------------------------------------------------------------------

/// Mono circular delay line with linearly interpolated fractional reads.
///
/// Reads are relative to the write cursor: when reading before writing, a sample written at
/// time `t` is returned by `read_interpolated(d)` at time `t + d`.
#[derive(Debug, Default, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    buffer_mask: usize,
    write_pos: usize,
}

impl DelayLine {
    /// Create a new delay line which can hold at least `max_delay_seconds` of audio at the given
    /// sample rate.
    pub fn new(sample_rate: u32, max_delay_seconds: f32) -> Self {
        let max_delay_frames = (max_delay_seconds * sample_rate as f32).ceil() as usize;
        Self::with_capacity(max_delay_frames)
    }

    /// Create a new delay line which can delay by at least `max_delay_frames` samples.
    pub fn with_capacity(max_delay_frames: usize) -> Self {
        // two extra frames for the interpolation's upper tap
        let buffer_frames = (max_delay_frames + 2).next_power_of_two();
        Self {
            buffer: vec![0.0; buffer_frames],
            buffer_mask: buffer_frames - 1,
            write_pos: 0,
        }
    }

    /// Buffer size in samples.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Reset the delay buffer and write position.
    pub fn flush(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    /// Store a sample at the write cursor and advance the cursor.
    #[inline]
    pub fn write(&mut self, sample: f32) {
        let len = self.buffer.len();
        let index = self.write_pos;
        assume!(unsafe: index < len);
        self.buffer[index] = sample;
        self.write_pos = (self.write_pos + 1) & self.buffer_mask;
    }

    /// Read the sample `delay` samples behind the write cursor, linearly interpolating between
    /// the two neighbouring samples. Callers must clamp `delay` to the line's capacity.
    #[inline]
    pub fn read_interpolated(&self, delay: f32) -> f32 {
        debug_assert!(
            delay >= 0.0 && (delay.ceil() as usize) < self.buffer.len(),
            "Delay time exceeds the delay line's capacity"
        );
        let len = self.buffer.len();
        let read_pos = self.write_pos as f32 - delay;
        let read_pos_floor = read_pos.floor();
        let fraction = read_pos - read_pos_floor;

        // wrap negative positions via the mask: the buffer size is a power of two
        let index1 = (read_pos_floor as isize as usize) & self.buffer_mask;
        let index2 = (index1 + 1) & self.buffer_mask;
        assume!(unsafe: index1 < len);
        assume!(unsafe: index2 < len);

        let value1 = self.buffer[index1];
        let value2 = self.buffer[index2];
        value1 + (value2 - value1) * fraction
    }
}

// -------------------------------------------------------------------------------------------------
