//! Sample-rate conversion of decoded tracks using rubato.

use rhythora_core::{Error, Result};
use rubato::{FftFixedIn, Resampler as RubatoResampler};
use tracing::debug;

const CHUNK_SIZE: usize = 1024;

/// Converts decoded audio to the graph's sample rate.
pub struct Resampler {
    resampler: FftFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Deinterleaved input not yet consumed by a full chunk.
    pending: Vec<Vec<f32>>,
}

impl Resampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        let channels = channels.max(1);
        let resampler = FftFixedIn::new(
            input_rate as usize,
            output_rate as usize,
            CHUNK_SIZE,
            2,
            channels,
        )
        .map_err(|e| Error::AudioDecode(format!("Failed to create resampler: {e}")))?;

        debug!("Resampler created: {input_rate}Hz -> {output_rate}Hz, {channels} channels");

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
            pending: vec![Vec::new(); channels],
        })
    }

    pub const fn needs_resampling(&self) -> bool {
        self.input_rate != self.output_rate
    }

    /// Feed interleaved samples, returning whatever full chunks produced.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if !self.needs_resampling() {
            return Ok(input.to_vec());
        }

        for frame in input.chunks_exact(self.channels) {
            for (pending, &sample) in self.pending.iter_mut().zip(frame) {
                pending.push(sample);
            }
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= CHUNK_SIZE {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_SIZE).collect())
                .collect();
            let resampled = self.run(&chunk)?;
            interleave_into(&resampled, usize::MAX, &mut output);
        }
        Ok(output)
    }

    /// Pad and convert the tail left over by [`Self::process`].
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let remaining = self.pending[0].len();
        if !self.needs_resampling() || remaining == 0 {
            self.pending.iter_mut().for_each(Vec::clear);
            return Ok(Vec::new());
        }

        let chunk: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|ch| {
                let mut data = std::mem::take(ch);
                data.extend(std::iter::repeat_n(0.0, CHUNK_SIZE - remaining));
                data
            })
            .collect();
        let resampled = self.run(&chunk)?;

        // Only keep the part that corresponds to real input.
        let frames =
            (remaining as f64 * f64::from(self.output_rate) / f64::from(self.input_rate)) as usize;
        let mut output = Vec::new();
        interleave_into(&resampled, frames, &mut output);
        Ok(output)
    }

    fn run(&mut self, chunk: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        self.resampler
            .process(chunk, None)
            .map_err(|e| Error::AudioDecode(format!("Resample failed: {e}")))
    }
}

/// Append up to `max_frames` frames of planar `channels` to `output`.
fn interleave_into(channels: &[Vec<f32>], max_frames: usize, output: &mut Vec<f32>) {
    let Some(first) = channels.first() else {
        return;
    };
    let frames = first.len().min(max_frames);
    output.reserve(frames * channels.len());
    for frame in 0..frames {
        for ch in channels {
            output.push(ch[frame]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_resampling() {
        let mut resampler = Resampler::new(48000, 48000, 2).unwrap();
        assert!(!resampler.needs_resampling());

        let input = vec![0.5f32; 2048];
        assert_eq!(resampler.process(&input).unwrap().len(), input.len());
        assert!(resampler.flush().unwrap().is_empty());
    }

    #[test]
    fn test_upsampling_doubles_frame_count() {
        let mut resampler = Resampler::new(24000, 48000, 1).unwrap();
        let input = vec![0.25f32; 3000];
        let mut output = resampler.process(&input).unwrap();
        output.extend(resampler.flush().unwrap());
        assert_eq!(output.len(), 6000);
    }
}
