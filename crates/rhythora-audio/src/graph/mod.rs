//! Audio rendering graph.
//!
//! [`AudioGraph`] is the seam between the engine and whatever renders audio.
//! [`SoftwareGraph`] is the native implementation: it renders on demand, so a
//! cpal callback can drive it in production and tests can drive it by hand.

mod node;
mod param;
mod software;

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_channel::Receiver;
use rhythora_core::Result;

pub use param::AudioParam;
pub use software::SoftwareGraph;

/// Handle to a node living inside a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Automatable node parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Linear gain of a gain node.
    Gain,
    /// Delay in seconds of a delay node.
    DelayTime,
}

/// Whether the graph clock is advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphState {
    /// Not yet started or explicitly suspended. Renders silence, clock frozen.
    #[default]
    Suspended,
    Running,
}

/// Notifications raised while rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// A buffer source finished, either by reaching its end or by `stop`.
    SourceEnded(NodeId),
}

/// Decoded PCM audio, interleaved `f32`.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: u16,
    samples: Arc<[f32]>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: impl Into<Arc<[f32]>>) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            samples: samples.into(),
        }
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Sample of `channel` at `frame`; mono buffers feed every channel.
    pub(crate) fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = usize::from(self.channels);
        let channel = channel.min(channels - 1);
        self.samples
            .get(frame * channels + channel)
            .copied()
            .unwrap_or(0.0)
    }
}

/// A rendering graph with a clock, long-lived effect nodes and one-shot
/// buffer sources.
///
/// Times are in seconds on the graph clock ([`AudioGraph::current_time`]).
/// Operations on unknown nodes return an error or `false`; they never panic.
pub trait AudioGraph: Send + Sync + 'static {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Seconds of audio rendered while running.
    fn current_time(&self) -> f64;

    fn state(&self) -> GraphState;

    /// Start (or restart) the clock.
    fn resume(&self);

    fn suspend(&self);

    /// The node whose input is heard.
    fn destination(&self) -> NodeId;

    fn create_gain(&self, gain: f32) -> NodeId;

    /// Create a delay node that can delay by up to `max_delay` seconds.
    fn create_delay(&self, max_delay: f64) -> NodeId;

    /// Create an analysis tap keeping the last `fft_size` mono samples.
    fn create_analyser(&self, fft_size: usize) -> NodeId;

    /// Create a source that plays `buffer` once after [`AudioGraph::start`].
    ///
    /// Sources dispose of themselves after they end.
    fn create_buffer_source(&self, buffer: AudioBuffer) -> NodeId;

    fn connect(&self, from: NodeId, to: NodeId) -> Result<()>;

    /// Remove every outgoing connection of `node` and let it be collected.
    ///
    /// Returns `false` if the node no longer exists.
    fn disconnect(&self, node: NodeId) -> bool;

    /// Set a parameter immediately, cancelling any ramp in progress.
    fn set_param(&self, node: NodeId, param: Param, value: f32) -> Result<()>;

    /// Ramp a parameter linearly from its current value to `value`, reaching
    /// it at `end_time`.
    fn linear_ramp_to(&self, node: NodeId, param: Param, value: f32, end_time: f64) -> Result<()>;

    /// Start a buffer source at `when`, `offset` seconds into its buffer.
    fn start(&self, node: NodeId, when: f64, offset: f64) -> Result<()>;

    /// Stop a buffer source at `when`. Raises [`GraphEvent::SourceEnded`].
    fn stop(&self, node: NodeId, when: f64) -> Result<()>;

    /// Most recent time-domain window of an analyser node.
    fn analyser_data(&self, node: NodeId) -> Option<Vec<f32>>;

    /// Decode encoded audio into a buffer at the graph's sample rate.
    fn decode(&self, data: Bytes) -> impl Future<Output = Result<AudioBuffer>> + Send;

    /// Stream of render notifications.
    fn events(&self) -> Receiver<GraphEvent>;
}
