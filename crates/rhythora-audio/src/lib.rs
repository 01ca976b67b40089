//! # rhythora-audio
//!
//! Audio playback and synchronization engine for Rhythora.
//!
//! Features:
//! - Software audio graph with gain, delay, analyser and buffer-source nodes
//! - Latency compensation with paired output/analysis delay lines
//! - Music session control with last-request-wins load resolution
//! - Lazily cached one-shot hitsounds and sound effects
//! - Low-latency cpal output

pub mod buffer;
pub mod decode;
pub mod engine;
pub mod fetch;
pub mod graph;
pub mod output;
pub mod resample;
pub mod session;
pub mod sound_bank;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{AudioEngine, Channel, MAX_LATENCY_SECONDS};
pub use fetch::{Fetch, HttpFetcher};
pub use graph::{AudioBuffer, AudioGraph, GraphEvent, GraphState, NodeId, Param, SoftwareGraph};
pub use output::AudioOutput;
pub use session::MusicSessionController;
pub use sound_bank::SoundBank;
