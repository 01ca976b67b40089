//! Node kinds and their per-block processing.

use std::collections::VecDeque;

use super::{AudioBuffer, AudioParam};
use crate::buffer::DelayLine;

/// Timing of the block being rendered.
pub(super) struct RenderContext {
    pub sample_rate: u32,
    pub channels: usize,
    pub start_frame: u64,
    pub frames: usize,
}

impl RenderContext {
    /// Graph time of frame `i` within the block.
    pub fn time(&self, i: usize) -> f64 {
        (self.start_frame + i as u64) as f64 / f64::from(self.sample_rate)
    }

    pub fn end_time(&self) -> f64 {
        self.time(self.frames)
    }
}

pub(super) struct Analyser {
    fft_size: usize,
    window: VecDeque<f32>,
}

impl Analyser {
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(32);
        Self {
            fft_size,
            window: VecDeque::from(vec![0.0; fft_size]),
        }
    }

    pub fn snapshot(&self) -> Vec<f32> {
        self.window.iter().copied().collect()
    }
}

pub(super) struct BufferSource {
    buffer: AudioBuffer,
    /// `(when, offset)` once started.
    start: Option<(f64, f64)>,
    stop_at: Option<f64>,
    position: usize,
    playing: bool,
    ended: bool,
}

impl BufferSource {
    pub const fn new(buffer: AudioBuffer) -> Self {
        Self {
            buffer,
            start: None,
            stop_at: None,
            position: 0,
            playing: false,
            ended: false,
        }
    }

    pub const fn is_started(&self) -> bool {
        self.start.is_some()
    }

    pub const fn has_ended(&self) -> bool {
        self.ended
    }

    pub fn start(&mut self, when: f64, offset: f64) {
        self.start = Some((when, offset.max(0.0)));
    }

    /// Schedule the end; an earlier stop time wins over a later one.
    pub fn stop(&mut self, when: f64) {
        self.stop_at = Some(self.stop_at.map_or(when, |at| at.min(when)));
    }

    fn render(&mut self, output: &mut [f32], ctx: &RenderContext) {
        for (i, frame) in output.chunks_exact_mut(ctx.channels).enumerate() {
            if self.ended {
                return;
            }
            let t = ctx.time(i);
            if self.stop_at.is_some_and(|at| t >= at) {
                self.ended = true;
                return;
            }
            if !self.playing {
                match self.start {
                    Some((when, offset)) if t >= when => {
                        self.playing = true;
                        self.position = (offset * f64::from(self.buffer.sample_rate())) as usize;
                    }
                    _ => continue,
                }
            }
            if self.position >= self.buffer.frames() {
                self.ended = true;
                return;
            }
            for (channel, sample) in frame.iter_mut().enumerate() {
                *sample = self.buffer.sample(self.position, channel);
            }
            self.position += 1;
        }
    }
}

pub(super) enum NodeKind {
    Destination,
    Gain(AudioParam),
    Delay { time: AudioParam, line: DelayLine },
    Analyser(Analyser),
    Source(BufferSource),
}

impl NodeKind {
    /// Render one block. `input` is the mix of every incoming connection and
    /// `output` starts zeroed; both hold `ctx.frames` interleaved frames.
    pub fn process(&mut self, input: &[f32], output: &mut [f32], ctx: &RenderContext) {
        match self {
            Self::Destination => output.copy_from_slice(input),
            Self::Gain(gain) => {
                for (i, (frame_in, frame_out)) in input
                    .chunks_exact(ctx.channels)
                    .zip(output.chunks_exact_mut(ctx.channels))
                    .enumerate()
                {
                    let g = gain.value_at(ctx.time(i));
                    for (sample_in, sample_out) in frame_in.iter().zip(frame_out) {
                        *sample_out = sample_in * g;
                    }
                }
                gain.settle(ctx.end_time());
            }
            Self::Delay { time, line } => {
                // Delay time is sampled once per block.
                let seconds = f64::from(time.value_at(ctx.time(0)).max(0.0));
                line.set_delay_frames((seconds * f64::from(ctx.sample_rate)).round() as usize);
                for (frame_in, frame_out) in input
                    .chunks_exact(ctx.channels)
                    .zip(output.chunks_exact_mut(ctx.channels))
                {
                    line.process_frame(frame_in, frame_out);
                }
                time.settle(ctx.end_time());
            }
            Self::Analyser(analyser) => {
                output.copy_from_slice(input);
                for frame in input.chunks_exact(ctx.channels) {
                    let mono = frame.iter().sum::<f32>() / ctx.channels as f32;
                    if analyser.window.len() == analyser.fft_size {
                        analyser.window.pop_front();
                    }
                    analyser.window.push_back(mono);
                }
            }
            Self::Source(source) => source.render(output, ctx),
        }
    }

    pub fn param_mut(&mut self, param: super::Param) -> Option<&mut AudioParam> {
        match (self, param) {
            (Self::Gain(gain), super::Param::Gain) => Some(gain),
            (Self::Delay { time, .. }, super::Param::DelayTime) => Some(time),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Destination => "destination",
            Self::Gain(_) => "gain",
            Self::Delay { .. } => "delay",
            Self::Analyser(_) => "analyser",
            Self::Source(_) => "buffer source",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(frames: usize, start_frame: u64) -> RenderContext {
        RenderContext {
            sample_rate: 10,
            channels: 1,
            start_frame,
            frames,
        }
    }

    fn ramp_buffer(frames: usize) -> AudioBuffer {
        AudioBuffer::new(10, 1, (0..frames).map(|i| i as f32).collect::<Vec<_>>())
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_source_waits_for_start_time() {
        let mut source = BufferSource::new(ramp_buffer(10));
        source.start(0.3, 0.0);
        let mut output = vec![0.0; 5];
        source.render(&mut output, &ctx(5, 0));
        assert_eq!(output, vec![0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_source_offset_and_end() {
        let mut source = BufferSource::new(ramp_buffer(10));
        source.start(0.0, 0.8);
        let mut output = vec![0.0; 4];
        source.render(&mut output, &ctx(4, 0));
        assert_eq!(output, vec![8.0, 9.0, 0.0, 0.0]);
        assert!(source.has_ended());
    }

    #[test]
    fn test_source_stop_before_start_ends() {
        let mut source = BufferSource::new(ramp_buffer(10));
        source.stop(0.0);
        let mut output = vec![0.0; 2];
        source.render(&mut output, &ctx(2, 0));
        assert!(source.has_ended());
        assert!(!source.is_started());
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_gain_ramp_is_applied_per_frame() {
        let mut param = AudioParam::new(0.0);
        param.ramp_to(1.0, 0.0, 0.4);
        let mut node = NodeKind::Gain(param);
        let input = vec![1.0; 5];
        let mut output = vec![0.0; 5];
        node.process(&input, &mut output, &ctx(5, 0));
        assert_eq!(output[0], 0.0);
        assert!((output[2] - 0.5).abs() < 1e-6);
        assert_eq!(output[4], 1.0);
    }

    #[test]
    fn test_analyser_keeps_latest_window() {
        let mut node = NodeKind::Analyser(Analyser::new(32));
        let input: Vec<f32> = (0..40).map(|i| i as f32).collect();
        let mut output = vec![0.0; 40];
        node.process(&input, &mut output, &ctx(40, 0));
        let NodeKind::Analyser(analyser) = &node else {
            unreachable!()
        };
        let window = analyser.snapshot();
        assert_eq!(window.len(), 32);
        assert!((window[31] - 39.0).abs() < f32::EPSILON);
        assert_eq!(output, input);
    }
}
