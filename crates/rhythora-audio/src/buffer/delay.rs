//! Interleaved multichannel delay line.

use super::RingBuffer;

/// Delays interleaved frames by a whole number of frames.
///
/// The ring always holds exactly `delay_frames` frames between calls to
/// [`DelayLine::process_frame`]: each call pushes one frame and pops the
/// oldest one.
pub struct DelayLine {
    ring: RingBuffer,
    channels: usize,
    delay_frames: usize,
    max_frames: usize,
}

impl DelayLine {
    /// Create a delay line able to hold up to `max_frames` frames of delay.
    pub fn new(channels: usize, max_frames: usize) -> Self {
        let channels = channels.max(1);
        Self {
            ring: RingBuffer::new((max_frames + 1) * channels),
            channels,
            delay_frames: 0,
            max_frames,
        }
    }

    pub const fn delay_frames(&self) -> usize {
        self.delay_frames
    }

    /// Change the delay, clamped to the line's maximum.
    ///
    /// Growing inserts silence; shrinking drops the oldest frames.
    pub fn set_delay_frames(&mut self, frames: usize) {
        let frames = frames.min(self.max_frames);
        if frames > self.delay_frames {
            self.ring
                .write_silence((frames - self.delay_frames) * self.channels);
        } else if frames < self.delay_frames {
            self.ring.skip((self.delay_frames - frames) * self.channels);
        }
        self.delay_frames = frames;
    }

    /// Push one input frame and write the delayed frame into `output`.
    pub fn process_frame(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), self.channels);
        debug_assert_eq!(output.len(), self.channels);
        self.ring.write(input);
        self.ring.read(output);
    }
}
