//! Audio engine owning the shared output graph.
//!
//! The engine builds a fixed set of long-lived nodes once, on
//! [`AudioEngine::initialize`]:
//!
//! ```text
//! music source -> music volume -+-> output delay ---> destination
//!                               +-> analysis delay -> analyser
//! hitsounds volume -------------------------------> destination
//! sound effects volume ---------------------------> destination
//! ```
//!
//! The music source and its volume node are created per track and torn down
//! on release. Everything else lives until the engine is dropped.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use rhythora_core::{Result, SharedSettings};
use tracing::{debug, error, info, trace, warn};

use crate::graph::{AudioBuffer, AudioGraph, GraphEvent, GraphState, NodeId, Param};

/// Longest latency compensation either delay line can apply.
pub const MAX_LATENCY_SECONDS: f64 = 2.0;

/// Window size of the analysis tap.
pub const ANALYSER_FFT_SIZE: usize = 512;

/// Volume paths of the output graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Music,
    Hitsounds,
    SoundEffects,
}

/// Nodes created once at initialization.
#[derive(Debug, Clone, Copy)]
struct OutputNodes {
    output_delay: NodeId,
    analysis_delay: NodeId,
    analyser: NodeId,
    hitsounds_volume: NodeId,
    sound_effects_volume: NodeId,
}

/// The current track's source and its private volume node.
#[derive(Debug, Clone, Copy)]
struct MusicNodes {
    volume: NodeId,
    source: NodeId,
}

#[derive(Default)]
struct EngineState {
    nodes: Option<OutputNodes>,
    music: Option<MusicNodes>,
    /// Last decoded track, kept so a paused track can be restarted.
    music_buffer: Option<AudioBuffer>,
}

/// Stateful owner of the output graph.
///
/// All graph mutation goes through this type. Operations report success as
/// `bool` and log the reason for any failure.
pub struct AudioEngine<G: AudioGraph> {
    graph: Arc<G>,
    settings: SharedSettings,
    state: Mutex<EngineState>,
    events: Receiver<GraphEvent>,
}

impl<G: AudioGraph> AudioEngine<G> {
    /// Create an engine over `graph`. No nodes exist until [`Self::initialize`].
    pub fn new(graph: Arc<G>, settings: SharedSettings) -> Self {
        let events = graph.events();
        Self {
            graph,
            settings,
            state: Mutex::new(EngineState::default()),
            events,
        }
    }

    pub fn graph(&self) -> &Arc<G> {
        &self.graph
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().nodes.is_some()
    }

    pub fn has_music_source(&self) -> bool {
        self.state.lock().music.is_some()
    }

    /// Engine clock in seconds, `None` before initialization.
    pub fn current_time(&self) -> Option<f64> {
        self.is_initialized().then(|| self.graph.current_time())
    }

    /// Start the clock and build the output graph.
    ///
    /// Returns `false` if the engine was already initialized.
    pub fn initialize(&self) -> bool {
        let mut state = self.state.lock();
        if state.nodes.is_some() {
            debug!("Audio engine already initialized");
            return false;
        }

        self.graph.resume();
        match self.build_output_nodes() {
            Ok(nodes) => {
                state.nodes = Some(nodes);
                info!(
                    "Audio engine initialized: {} Hz, {} channels",
                    self.graph.sample_rate(),
                    self.graph.channels()
                );
                true
            }
            Err(e) => {
                error!("Failed to build output graph: {e}");
                false
            }
        }
    }

    /// Initialize if needed and make sure the clock is running.
    pub fn ensure_running(&self) -> bool {
        if !self.is_initialized() {
            self.initialize();
        }
        if self.graph.state() == GraphState::Suspended {
            self.graph.resume();
        }
        self.is_initialized()
    }

    fn build_output_nodes(&self) -> Result<OutputNodes> {
        let settings = self.settings.read().clone();
        let graph = &*self.graph;

        let nodes = OutputNodes {
            output_delay: graph.create_delay(MAX_LATENCY_SECONDS),
            analysis_delay: graph.create_delay(MAX_LATENCY_SECONDS),
            analyser: graph.create_analyser(ANALYSER_FFT_SIZE),
            hitsounds_volume: graph.create_gain(settings.hitsounds_volume),
            sound_effects_volume: graph.create_gain(settings.sound_effects_volume),
        };

        let destination = graph.destination();
        graph.connect(nodes.output_delay, destination)?;
        graph.connect(nodes.analysis_delay, nodes.analyser)?;
        graph.connect(nodes.hitsounds_volume, destination)?;
        graph.connect(nodes.sound_effects_volume, destination)?;

        let (output, analysis) = latency_delays(settings.audio_latency_offset_ms);
        graph.set_param(nodes.output_delay, Param::DelayTime, output)?;
        graph.set_param(nodes.analysis_delay, Param::DelayTime, analysis)?;
        Ok(nodes)
    }

    /// Volume node feeding `channel`, if it currently exists.
    pub fn channel_node(&self, channel: Channel) -> Option<NodeId> {
        let state = self.state.lock();
        let nodes = state.nodes.as_ref()?;
        match channel {
            Channel::Music => state.music.map(|music| music.volume),
            Channel::Hitsounds => Some(nodes.hitsounds_volume),
            Channel::SoundEffects => Some(nodes.sound_effects_volume),
        }
    }

    /// Ramp a channel's volume linearly to `value` over `fade_seconds`.
    ///
    /// A fade of zero or less applies the value at the current clock tick.
    pub fn set_volume(&self, channel: Channel, value: f32, fade_seconds: f64) -> bool {
        let Some(node) = self.channel_node(channel) else {
            debug!("No {channel:?} volume node to set");
            return false;
        };
        match self.ramp_gain(node, value.max(0.0), fade_seconds) {
            Ok(()) => {
                trace!("{channel:?} volume -> {value:.2} over {fade_seconds:.2}s");
                true
            }
            Err(e) => {
                warn!("Failed to set {channel:?} volume: {e}");
                false
            }
        }
    }

    /// Apply a signed latency offset in milliseconds.
    ///
    /// Negative offsets delay what the player hears, positive offsets delay
    /// the analysis tap.
    pub fn set_latency_offset_ms(&self, ms: f64) -> bool {
        let Some(nodes) = self.state.lock().nodes else {
            debug!("Latency offset ignored before initialization");
            return false;
        };
        let (output, analysis) = latency_delays(ms);
        let applied = self
            .graph
            .set_param(nodes.output_delay, Param::DelayTime, output)
            .and_then(|()| {
                self.graph
                    .set_param(nodes.analysis_delay, Param::DelayTime, analysis)
            });
        match applied {
            Ok(()) => {
                debug!("Latency offset {ms}ms: output delay {output:.3}s, analysis delay {analysis:.3}s");
                true
            }
            Err(e) => {
                warn!("Failed to apply latency offset: {e}");
                false
            }
        }
    }

    /// Create the music source for `buffer`, or for the retained buffer when
    /// `buffer` is `None`.
    ///
    /// With `fade_in_seconds >= 0` the volume starts at zero and ramps to the
    /// music volume; a negative fade starts at full music volume.
    pub fn create_music_source(
        &self,
        buffer: Option<AudioBuffer>,
        play: bool,
        fade_in_seconds: f64,
    ) -> bool {
        self.create_music_source_at(buffer, play, fade_in_seconds, 0.0)
    }

    /// Like [`Self::create_music_source`], starting `offset` seconds into the
    /// buffer.
    pub fn create_music_source_at(
        &self,
        buffer: Option<AudioBuffer>,
        play: bool,
        fade_in_seconds: f64,
        offset: f64,
    ) -> bool {
        let mut state = self.state.lock();
        let Some(nodes) = state.nodes else {
            warn!("Cannot create music source before initialization");
            return false;
        };
        if state.music.is_some() {
            warn!("Music source already exists");
            return false;
        }
        if let Some(buffer) = buffer {
            state.music_buffer = Some(buffer);
        }
        let Some(buffer) = state.music_buffer.clone() else {
            warn!("No music buffer to create a source from");
            return false;
        };

        let target = self.settings.read().music_volume;
        let initial = if fade_in_seconds >= 0.0 { 0.0 } else { target };
        let duration = buffer.duration();

        let graph = &*self.graph;
        let music = MusicNodes {
            volume: graph.create_gain(initial),
            source: graph.create_buffer_source(buffer),
        };

        let wired = graph
            .connect(music.source, music.volume)
            .and_then(|()| graph.connect(music.volume, nodes.output_delay))
            .and_then(|()| graph.connect(music.volume, nodes.analysis_delay))
            .and_then(|()| {
                if play {
                    graph.start(music.source, graph.current_time(), offset)
                } else {
                    Ok(())
                }
            })
            .and_then(|()| {
                if fade_in_seconds >= 0.0 {
                    self.ramp_gain(music.volume, target, fade_in_seconds)
                } else {
                    Ok(())
                }
            });
        if let Err(e) = wired {
            error!("Failed to wire music source: {e}");
            graph.disconnect(music.source);
            graph.disconnect(music.volume);
            return false;
        }

        state.music = Some(music);
        debug!(
            "Music source {} created ({duration:.1}s, play: {play}, offset: {offset:.2}s, fade in: {fade_in_seconds}s)",
            music.source
        );
        true
    }

    /// Release the current music source.
    ///
    /// With a negative or non-finite fade the source stops and is disconnected
    /// at once.
    /// Otherwise its volume ramps to zero, the source stops at the end of the
    /// fade, and both nodes are disconnected once the fade has elapsed.
    /// Returns `false` if there is no music source.
    pub fn release_music_source(&self, fade_out_seconds: f64) -> bool {
        let Some(music) = self.state.lock().music.take() else {
            debug!("No music source to release");
            return false;
        };
        let graph = &self.graph;
        let now = graph.current_time();

        let fade = if fade_out_seconds < 0.0 {
            None
        } else {
            match Duration::try_from_secs_f64(fade_out_seconds) {
                Ok(fade) => Some(fade),
                Err(e) => {
                    warn!("Invalid fade out {fade_out_seconds}s ({e}), releasing at once");
                    None
                }
            }
        };
        let Some(fade) = fade else {
            if let Err(e) = graph.stop(music.source, now) {
                trace!("Stop on release: {e}");
            }
            graph.disconnect(music.source);
            graph.disconnect(music.volume);
            debug!("Music source {} released", music.source);
            return true;
        };

        if let Err(e) = self.ramp_gain(music.volume, 0.0, fade_out_seconds) {
            warn!("Failed to fade out music: {e}");
        }
        if let Err(e) = graph.stop(music.source, now + fade_out_seconds) {
            trace!("Stop on release: {e}");
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let graph = Arc::clone(graph);
                handle.spawn(async move {
                    tokio::time::sleep(fade).await;
                    graph.disconnect(music.source);
                    graph.disconnect(music.volume);
                    trace!("Deferred cleanup of {} done", music.source);
                });
            }
            Err(_) => {
                debug!(
                    "No async runtime, dropping {fade_out_seconds}s fade of {}",
                    music.source
                );
                graph.disconnect(music.source);
                graph.disconnect(music.volume);
            }
        }
        debug!(
            "Music source {} releasing over {fade_out_seconds}s",
            music.source
        );
        true
    }

    /// Play `buffer` once on `channel`. The source disposes of itself when
    /// it ends.
    pub fn play_one_shot(&self, buffer: AudioBuffer, channel: Channel) -> bool {
        let Some(target) = self.channel_node(channel) else {
            debug!("No {channel:?} volume node for one-shot playback");
            return false;
        };
        let graph = &*self.graph;
        let source = graph.create_buffer_source(buffer);
        let started = graph
            .connect(source, target)
            .and_then(|()| graph.start(source, graph.current_time(), 0.0));
        if let Err(e) = started {
            warn!("Failed to start one-shot on {channel:?}: {e}");
            graph.disconnect(source);
            return false;
        }
        trace!("One-shot {source} on {channel:?}");
        true
    }

    /// Latest time-domain window of the analysis tap.
    pub fn analyser_snapshot(&self) -> Option<Vec<f32>> {
        let analyser = self.state.lock().nodes?.analyser;
        self.graph.analyser_data(analyser)
    }

    /// Collect pending graph notifications.
    ///
    /// Sources ending after `stop` are routine and only traced.
    pub fn drain_events(&self) -> Vec<GraphEvent> {
        let events: Vec<GraphEvent> = self.events.try_iter().collect();
        for event in &events {
            trace!("Graph event: {event:?}");
        }
        events
    }

    fn ramp_gain(&self, node: NodeId, value: f32, fade_seconds: f64) -> Result<()> {
        if fade_seconds > 0.0 {
            let end = self.graph.current_time() + fade_seconds;
            self.graph.linear_ramp_to(node, Param::Gain, value, end)
        } else {
            self.graph.set_param(node, Param::Gain, value)
        }
    }
}

/// `(output, analysis)` delays in seconds for a signed offset in ms.
fn latency_delays(ms: f64) -> (f32, f32) {
    let output = ((-ms).max(0.0) / 1000.0).min(MAX_LATENCY_SECONDS);
    let analysis = (ms.max(0.0) / 1000.0).min(MAX_LATENCY_SECONDS);
    (output as f32, analysis as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SoftwareGraph;
    use parking_lot::RwLock;
    use rhythora_core::UserSettings;

    fn engine_with(settings: UserSettings) -> AudioEngine<SoftwareGraph> {
        AudioEngine::new(
            Arc::new(SoftwareGraph::new(8000, 2)),
            Arc::new(RwLock::new(settings)),
        )
    }

    fn engine() -> AudioEngine<SoftwareGraph> {
        engine_with(UserSettings::default())
    }

    fn tone(seconds: f64) -> AudioBuffer {
        let frames = (seconds * 8000.0) as usize;
        AudioBuffer::new(8000, 1, vec![0.5; frames])
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let engine = engine();
        assert_eq!(engine.current_time(), None);
        assert!(engine.initialize());
        assert!(!engine.initialize());
        assert_eq!(engine.graph().state(), GraphState::Running);
        // destination + 2 delays + analyser + 2 volumes
        assert_eq!(engine.graph().node_count(), 6);
        assert_eq!(engine.current_time(), Some(0.0));
    }

    #[test]
    fn test_ensure_running_resumes_suspended_clock() {
        let engine = engine();
        assert!(engine.ensure_running());
        engine.graph().suspend();
        assert!(engine.ensure_running());
        assert_eq!(engine.graph().state(), GraphState::Running);
    }

    #[test]
    fn test_initial_gains_come_from_settings() {
        let engine = engine_with(UserSettings {
            hitsounds_volume: 0.3,
            sound_effects_volume: 0.6,
            ..UserSettings::default()
        });
        engine.initialize();
        let hitsounds = engine.channel_node(Channel::Hitsounds).unwrap();
        let effects = engine.channel_node(Channel::SoundEffects).unwrap();
        assert!((engine.graph().param_value(hitsounds, Param::Gain).unwrap() - 0.3).abs() < 1e-6);
        assert!((engine.graph().param_value(effects, Param::Gain).unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_set_volume_without_fade_is_immediate() {
        let engine = engine();
        assert!(!engine.set_volume(Channel::Hitsounds, 0.5, 0.0));
        engine.initialize();

        assert!(engine.set_volume(Channel::Hitsounds, 0.25, 0.0));
        let node = engine.channel_node(Channel::Hitsounds).unwrap();
        let value = engine.graph().param_value(node, Param::Gain).unwrap();
        assert!((value - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_set_volume_fades_linearly() {
        let engine = engine();
        engine.initialize();
        let node = engine.channel_node(Channel::SoundEffects).unwrap();

        assert!(engine.set_volume(Channel::SoundEffects, 0.0, 1.0));
        engine.graph().advance(0.5);
        let halfway = engine.graph().param_value(node, Param::Gain).unwrap();
        assert!((halfway - 0.5).abs() < 0.01, "got {halfway}");
        engine.graph().advance(0.6);
        let done = engine.graph().param_value(node, Param::Gain).unwrap();
        assert!(done.abs() < 1e-6);
    }

    #[test]
    fn test_music_volume_requires_source() {
        let engine = engine();
        engine.initialize();
        assert!(!engine.set_volume(Channel::Music, 0.5, 0.0));
        engine.create_music_source(Some(tone(1.0)), true, -1.0);
        assert!(engine.set_volume(Channel::Music, 0.5, 0.0));
    }

    #[test]
    fn test_latency_offset_sign_convention() {
        let engine = engine();
        assert!(!engine.set_latency_offset_ms(-50.0));
        engine.initialize();
        let nodes = engine.state.lock().nodes.unwrap();
        let delay = |node| engine.graph().param_value(node, Param::DelayTime).unwrap();

        assert!(engine.set_latency_offset_ms(-50.0));
        assert!((delay(nodes.output_delay) - 0.05).abs() < 1e-6);
        assert!(delay(nodes.analysis_delay).abs() < 1e-6);

        assert!(engine.set_latency_offset_ms(120.0));
        assert!(delay(nodes.output_delay).abs() < 1e-6);
        assert!((delay(nodes.analysis_delay) - 0.12).abs() < 1e-6);

        engine.set_latency_offset_ms(-10_000.0);
        assert!((delay(nodes.output_delay) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_create_music_source_needs_buffer_and_no_current() {
        let engine = engine();
        engine.initialize();
        assert!(!engine.create_music_source(None, true, 0.0));

        assert!(engine.create_music_source(Some(tone(1.0)), true, 0.0));
        assert!(!engine.create_music_source(Some(tone(1.0)), true, 0.0));
        assert_eq!(engine.graph().source_count(), 1);

        // The retained buffer is reused after a release.
        assert!(engine.release_music_source(-1.0));
        assert!(engine.create_music_source(None, false, -1.0));
    }

    #[test]
    fn test_music_fade_in_starts_silent() {
        let engine = engine_with(UserSettings {
            music_volume: 0.8,
            ..UserSettings::default()
        });
        engine.initialize();
        engine.create_music_source(Some(tone(2.0)), true, 1.0);
        let volume = engine.channel_node(Channel::Music).unwrap();
        assert!(engine.graph().param_value(volume, Param::Gain).unwrap().abs() < 1e-6);

        engine.graph().advance(1.0);
        let value = engine.graph().param_value(volume, Param::Gain).unwrap();
        assert!((value - 0.8).abs() < 0.01);
    }

    #[test]
    fn test_music_reaches_destination_and_analyser() {
        let engine = engine();
        engine.initialize();
        engine.create_music_source(Some(tone(1.0)), true, -1.0);

        let mut out = vec![0.0f32; 256 * 2];
        engine.graph().render(&mut out);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));

        let snapshot = engine.analyser_snapshot().unwrap();
        assert_eq!(snapshot.len(), ANALYSER_FFT_SIZE);
        assert!((snapshot[ANALYSER_FFT_SIZE - 1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_release_is_idempotent() {
        let engine = engine();
        engine.initialize();
        assert!(!engine.release_music_source(-1.0));

        engine.create_music_source(Some(tone(1.0)), true, -1.0);
        assert!(engine.release_music_source(-1.0));
        assert!(!engine.release_music_source(-1.0));
        assert!(!engine.has_music_source());
        assert_eq!(engine.graph().source_count(), 0);
        assert_eq!(engine.graph().node_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_faded_release_disconnects_after_fade() {
        let engine = engine();
        engine.initialize();
        engine.create_music_source(Some(tone(5.0)), true, -1.0);
        let volume = engine.channel_node(Channel::Music).unwrap();

        assert!(engine.release_music_source(0.5));
        assert!(!engine.has_music_source());
        // Still audible while fading.
        assert!(engine.graph().contains(volume));

        engine.graph().advance(0.6);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!engine.graph().contains(volume));
        assert_eq!(engine.graph().source_count(), 0);

        let ended = engine.drain_events();
        assert_eq!(ended.len(), 1);
    }

    #[test]
    fn test_faded_release_without_runtime_cleans_up_at_once() {
        let engine = engine();
        engine.initialize();
        engine.create_music_source(Some(tone(5.0)), true, -1.0);
        assert!(engine.release_music_source(0.5));
        assert_eq!(engine.graph().source_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_fade_releases_at_once() {
        let engine = engine();
        engine.initialize();
        let baseline = engine.graph().node_count();

        for fade in [f64::NAN, f64::INFINITY, 1e20] {
            engine.create_music_source(Some(tone(5.0)), true, -1.0);
            let volume = engine.channel_node(Channel::Music).unwrap();
            assert!(engine.release_music_source(fade));
            assert_eq!(engine.graph().source_count(), 0, "fade {fade}");
            assert!(!engine.graph().contains(volume), "fade {fade}");
            assert_eq!(engine.graph().node_count(), baseline, "fade {fade}");
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(engine.graph().node_count(), baseline);
    }

    #[test]
    fn test_one_shot_disposes_itself() {
        let engine = engine();
        assert!(!engine.play_one_shot(tone(0.1), Channel::Hitsounds));
        engine.initialize();

        assert!(engine.play_one_shot(tone(0.1), Channel::Hitsounds));
        assert!(engine.play_one_shot(tone(0.1), Channel::SoundEffects));
        assert_eq!(engine.graph().source_count(), 2);

        engine.graph().advance(0.2);
        assert_eq!(engine.graph().source_count(), 0);
        assert_eq!(engine.drain_events().len(), 2);
    }
}
