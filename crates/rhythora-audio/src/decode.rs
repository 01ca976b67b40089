//! Audio decoding using symphonia.

use std::io::Cursor;

use rhythora_core::{Error, Result};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, warn};

use crate::graph::AudioBuffer;
use crate::resample::Resampler;

/// Decoder over an in-memory encoded file.
pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
}

impl AudioDecoder {
    /// Probe `data` and set up a decoder for its first audio track.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(data)),
            MediaSourceStreamOptions::default(),
        );

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let probed = symphonia::default::get_probe()
            .format(&Hint::new(), mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| Error::AudioDecode(format!("Failed to probe format: {e}")))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::AudioDecode("No audio tracks found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::AudioDecode("Unknown sample rate".to_string()))?;
        let channels = track.codec_params.channels.map_or(2, |c| c.count() as u16);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::AudioDecode(format!("Failed to create decoder: {e}")))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Decode every remaining packet into interleaved samples.
    pub fn decode_all(&mut self) -> Result<Vec<f32>> {
        let mut samples = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    return Err(Error::AudioDecode(format!("Failed to read packet: {e}")));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let buf = sample_buf.get_or_insert_with(|| {
                        SampleBuffer::new(decoded.capacity() as u64, *decoded.spec())
                    });
                    if buf.capacity() < decoded.capacity() * decoded.spec().channels.count() {
                        *buf = SampleBuffer::new(decoded.capacity() as u64, *decoded.spec());
                    }
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt frame: skip it and keep going.
                    warn!("Decode error (skipping frame): {e}");
                }
                Err(e) => return Err(Error::AudioDecode(format!("Decode failed: {e}"))),
            }
        }

        Ok(samples)
    }
}

/// Decode an encoded audio file into a buffer at `target_rate`.
pub fn decode_to_buffer(data: &[u8], target_rate: u32) -> Result<AudioBuffer> {
    let mut decoder = AudioDecoder::from_bytes(data.to_vec())?;
    let samples = decoder.decode_all()?;
    if samples.is_empty() {
        return Err(Error::AudioDecode("Decoded no audio".to_string()));
    }

    let channels = decoder.channels();
    let source_rate = decoder.sample_rate();
    debug!(
        "Decoded {} frames at {source_rate} Hz, {channels} channels",
        samples.len() / usize::from(channels.max(1))
    );

    let samples = if source_rate == target_rate {
        samples
    } else {
        let mut resampler = Resampler::new(source_rate, target_rate, usize::from(channels))?;
        let mut resampled = resampler.process(&samples)?;
        resampled.extend(resampler.flush()?);
        resampled
    };

    Ok(AudioBuffer::new(target_rate, channels, samples))
}
