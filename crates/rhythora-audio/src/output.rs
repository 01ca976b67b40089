//! Audio output using cpal.
//!
//! The device callback pulls frames straight out of a [`SoftwareGraph`], so
//! the graph clock advances in step with the hardware.

use std::sync::Arc;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, Stream, StreamConfig,
};
use rhythora_core::{Error, Result};
use tracing::{debug, error, info};

use crate::graph::{AudioGraph, SoftwareGraph};

/// Audio output stream configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// Output device wrapper. Build the graph at [`Self::config`], then
/// [`Self::start`] it.
pub struct AudioOutput {
    device: Device,
    stream_config: StreamConfig,
    sample_format: SampleFormat,
    config: OutputConfig,
    device_name: String,
    stream: Option<Stream>,
}

impl AudioOutput {
    /// Open the default output device.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))?;

        Self::with_device(device)
    }

    /// Open a specific output device.
    pub fn with_device(device: Device) -> Result<Self> {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio output device: {device_name}");

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))?;

        debug!("Supported output config: {:?}", supported_config);

        let sample_format = supported_config.sample_format();
        let stream_config: StreamConfig = supported_config.into();
        let config = OutputConfig {
            sample_rate: stream_config.sample_rate.0,
            channels: stream_config.channels,
        };

        debug!(
            "Output config: {}Hz, {} channels, {sample_format:?}",
            config.sample_rate, config.channels
        );

        Ok(Self {
            device,
            stream_config,
            sample_format,
            config,
            device_name,
            stream: None,
        })
    }

    /// Start pulling audio from `graph`.
    ///
    /// The graph must render at the device's sample rate and channel count.
    pub fn start(&mut self, graph: Arc<SoftwareGraph>) -> Result<()> {
        if graph.sample_rate() != self.config.sample_rate
            || graph.channels() != self.config.channels
        {
            return Err(Error::InvalidArgument(format!(
                "Graph renders {} Hz x {}, device expects {} Hz x {}",
                graph.sample_rate(),
                graph.channels(),
                self.config.sample_rate,
                self.config.channels
            )));
        }

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(graph)?,
            SampleFormat::I16 => self.build_stream::<i16>(graph)?,
            SampleFormat::U16 => self.build_stream::<u16>(graph)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {other:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;
        info!("Audio output started on {}", self.device_name);

        self.stream = Some(stream);
        Ok(())
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        &self,
        graph: Arc<SoftwareGraph>,
    ) -> Result<Stream> {
        let err_fn = |err| {
            error!("Audio stream error: {err}");
        };

        let mut scratch: Vec<f32> = Vec::new();
        let stream = self
            .device
            .build_output_stream(
                &self.stream_config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    graph.render(&mut scratch);
                    for (sample, &s) in data.iter_mut().zip(&scratch) {
                        *sample = T::from_sample(soft_clip(s));
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))?;

        Ok(stream)
    }

    pub const fn config(&self) -> OutputConfig {
        self.config
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub const fn is_started(&self) -> bool {
        self.stream.is_some()
    }
}

/// Smoothly limit samples above 0.9 so stacked hitsounds do not wrap.
fn soft_clip(sample: f32) -> f32 {
    if sample.abs() > 0.9 {
        sample.tanh()
    } else {
        sample
    }
}

/// List available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(devices)
}
