// -------------------------------------------------------------------------------------------------

/// Fill the given buffer with zeros.
#[inline]
pub fn clear_buffer(buffer: &mut [f32]) {
    buffer.fill(0.0);
}

// -------------------------------------------------------------------------------------------------

/// Split an interleaved buffer into one `Vec` per channel. A trailing incomplete frame is dropped.
pub fn deinterleave(interleaved: &[f32], channel_count: usize) -> Vec<Vec<f32>> {
    if channel_count == 0 {
        return Vec::new();
    }
    let frame_count = interleaved.len() / channel_count;
    let mut planar = vec![Vec::with_capacity(frame_count); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, sample) in planar.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }
    planar
}

// -------------------------------------------------------------------------------------------------
