//! Software implementation of [`AudioGraph`].

use std::collections::{HashMap, HashSet};
use std::future::Future;

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rhythora_core::{Error, Result};
use tracing::{debug, trace};

use super::node::{Analyser, BufferSource, NodeKind, RenderContext};
use super::{AudioBuffer, AudioGraph, AudioParam, GraphEvent, GraphState, NodeId, Param};
use crate::buffer::DelayLine;

struct Node {
    kind: NodeKind,
    /// Set by `disconnect`; the node is dropped once nothing feeds it.
    released: bool,
}

struct GraphInner {
    state: GraphState,
    frames_rendered: u64,
    next_id: u64,
    nodes: HashMap<NodeId, Node>,
    /// `(from, to)` connections.
    edges: Vec<(NodeId, NodeId)>,
    /// Per-block scratch, reused across renders.
    outputs: HashMap<NodeId, Vec<f32>>,
}

impl GraphInner {
    fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        trace!("Created {} {id}", kind.name());
        self.nodes.insert(
            id,
            Node {
                kind,
                released: false,
            },
        );
        id
    }

    fn remove(&mut self, id: NodeId) {
        self.nodes.remove(&id);
        self.outputs.remove(&id);
        self.edges.retain(|&(from, to)| from != id && to != id);
    }

    /// Nodes reachable backwards from the destination and analysers, inputs
    /// before the nodes they feed.
    fn render_order(&self) -> Vec<NodeId> {
        let mut sinks: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| {
                matches!(node.kind, NodeKind::Destination | NodeKind::Analyser(_))
            })
            .map(|(&id, _)| id)
            .collect();
        sinks.sort_unstable();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut done = HashSet::new();
        let mut visiting = HashSet::new();
        for sink in sinks {
            self.visit(sink, &mut order, &mut done, &mut visiting);
        }
        order
    }

    fn visit(
        &self,
        id: NodeId,
        order: &mut Vec<NodeId>,
        done: &mut HashSet<NodeId>,
        visiting: &mut HashSet<NodeId>,
    ) {
        if done.contains(&id) || !visiting.insert(id) {
            // Already rendered, or a cycle: the back edge contributes nothing.
            return;
        }
        for &(from, to) in &self.edges {
            if to == id {
                self.visit(from, order, done, visiting);
            }
        }
        visiting.remove(&id);
        done.insert(id);
        order.push(id);
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeKind> {
        self.nodes
            .get_mut(&id)
            .map(|node| &mut node.kind)
            .ok_or_else(|| Error::Graph(format!("{id} does not exist")))
    }

    fn source_mut(&mut self, id: NodeId) -> Result<&mut BufferSource> {
        match self.node_mut(id)? {
            NodeKind::Source(source) => Ok(source),
            other => Err(Error::Graph(format!("{id} is a {}, not a source", other.name()))),
        }
    }

    fn now(&self, sample_rate: u32) -> f64 {
        self.frames_rendered as f64 / f64::from(sample_rate)
    }
}

/// Audio graph rendered in software, one block at a time.
///
/// The graph starts suspended; its clock only advances while running.
pub struct SoftwareGraph {
    sample_rate: u32,
    channels: u16,
    destination: NodeId,
    inner: Mutex<GraphInner>,
    event_tx: Sender<GraphEvent>,
    event_rx: Receiver<GraphEvent>,
}

impl SoftwareGraph {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let (event_tx, event_rx) = unbounded();
        let mut inner = GraphInner {
            state: GraphState::Suspended,
            frames_rendered: 0,
            next_id: 0,
            nodes: HashMap::new(),
            edges: Vec::new(),
            outputs: HashMap::new(),
        };
        let destination = inner.add(NodeKind::Destination);

        debug!("Software graph created: {sample_rate} Hz, {channels} channels");

        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            destination,
            inner: Mutex::new(inner),
            event_tx,
            event_rx,
        }
    }

    /// Render interleaved frames into `out`.
    ///
    /// Renders silence and leaves the clock untouched while suspended.
    pub fn render(&self, out: &mut [f32]) {
        let channels = usize::from(self.channels);
        let frames = out.len() / channels;
        out.fill(0.0);

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.state == GraphState::Suspended || frames == 0 {
            return;
        }

        let ctx = RenderContext {
            sample_rate: self.sample_rate,
            channels,
            start_frame: inner.frames_rendered,
            frames,
        };
        let len = frames * channels;
        let order = inner.render_order();

        let mut input = vec![0.0f32; len];
        let mut ended = Vec::new();
        for id in order {
            input.fill(0.0);
            for &(from, to) in &inner.edges {
                if to != id {
                    continue;
                }
                if let Some(upstream) = inner.outputs.get(&from) {
                    for (acc, sample) in input.iter_mut().zip(upstream) {
                        *acc += sample;
                    }
                }
            }

            let mut output = inner.outputs.remove(&id).unwrap_or_default();
            output.clear();
            output.resize(len, 0.0);
            if let Some(node) = inner.nodes.get_mut(&id) {
                node.kind.process(&input, &mut output, &ctx);
                if let NodeKind::Source(source) = &node.kind {
                    if source.has_ended() {
                        ended.push(id);
                    }
                }
            }
            inner.outputs.insert(id, output);
        }

        if let Some(mixed) = inner.outputs.get(&self.destination) {
            out[..len].copy_from_slice(mixed);
        }
        inner.frames_rendered += frames as u64;

        // Ended sources dispose of themselves.
        for id in ended {
            inner.remove(id);
            trace!("{id} ended");
            let _ = self.event_tx.send(GraphEvent::SourceEnded(id));
        }
        Self::collect_released(inner, &self.event_tx);
    }

    /// Render and discard `seconds` of audio, advancing the clock.
    pub fn advance(&self, seconds: f64) {
        const BLOCK_FRAMES: usize = 256;
        let channels = usize::from(self.channels);
        let mut remaining = (seconds * f64::from(self.sample_rate)).round() as usize;
        let mut block = vec![0.0f32; BLOCK_FRAMES * channels];
        while remaining > 0 {
            let frames = remaining.min(BLOCK_FRAMES);
            self.render(&mut block[..frames * channels]);
            remaining -= frames;
        }
    }

    /// Number of nodes alive, including the destination.
    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    /// Number of buffer sources alive (playing, scheduled or idle).
    pub fn source_count(&self) -> usize {
        self.inner
            .lock()
            .nodes
            .values()
            .filter(|node| matches!(node.kind, NodeKind::Source(_)))
            .count()
    }

    /// Whether `node` is still alive.
    pub fn contains(&self, node: NodeId) -> bool {
        self.inner.lock().nodes.contains_key(&node)
    }

    /// Current value of a node parameter, if the node has it.
    pub fn param_value(&self, node: NodeId, param: Param) -> Option<f32> {
        let mut inner = self.inner.lock();
        let now = inner.now(self.sample_rate);
        inner
            .nodes
            .get_mut(&node)?
            .kind
            .param_mut(param)
            .map(|value| value.value_at(now))
    }

    /// Delay of a delay node, in frames, as last applied by a render.
    pub fn delay_frames(&self, node: NodeId) -> Option<usize> {
        match &self.inner.lock().nodes.get(&node)?.kind {
            NodeKind::Delay { line, .. } => Some(line.delay_frames()),
            _ => None,
        }
    }

    /// Drop released nodes that no live connection feeds any more.
    ///
    /// A source collected before it ended still reports `SourceEnded`.
    fn collect_released(inner: &mut GraphInner, events: &Sender<GraphEvent>) {
        loop {
            let orphan = inner.nodes.iter().find_map(|(&id, node)| {
                let fed = inner.edges.iter().any(|&(_, to)| to == id);
                (node.released && !fed).then_some(id)
            });
            let Some(id) = orphan else {
                break;
            };
            if let Some(NodeKind::Source(source)) = inner.nodes.get(&id).map(|node| &node.kind) {
                if source.is_started() && !source.has_ended() {
                    let _ = events.send(GraphEvent::SourceEnded(id));
                }
            }
            trace!("Collected {id}");
            inner.remove(id);
        }
    }
}

impl AudioGraph for SoftwareGraph {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn current_time(&self) -> f64 {
        self.inner.lock().now(self.sample_rate)
    }

    fn state(&self) -> GraphState {
        self.inner.lock().state
    }

    fn resume(&self) {
        let mut inner = self.inner.lock();
        if inner.state != GraphState::Running {
            debug!("Graph clock resumed at {:.3}s", inner.now(self.sample_rate));
            inner.state = GraphState::Running;
        }
    }

    fn suspend(&self) {
        let mut inner = self.inner.lock();
        if inner.state != GraphState::Suspended {
            debug!("Graph clock suspended at {:.3}s", inner.now(self.sample_rate));
            inner.state = GraphState::Suspended;
        }
    }

    fn destination(&self) -> NodeId {
        self.destination
    }

    fn create_gain(&self, gain: f32) -> NodeId {
        self.inner.lock().add(NodeKind::Gain(AudioParam::new(gain)))
    }

    fn create_delay(&self, max_delay: f64) -> NodeId {
        let max_frames = (max_delay.max(0.0) * f64::from(self.sample_rate)).ceil() as usize;
        self.inner.lock().add(NodeKind::Delay {
            time: AudioParam::new(0.0),
            line: DelayLine::new(usize::from(self.channels), max_frames),
        })
    }

    fn create_analyser(&self, fft_size: usize) -> NodeId {
        self.inner
            .lock()
            .add(NodeKind::Analyser(Analyser::new(fft_size)))
    }

    fn create_buffer_source(&self, buffer: AudioBuffer) -> NodeId {
        self.inner
            .lock()
            .add(NodeKind::Source(BufferSource::new(buffer)))
    }

    fn connect(&self, from: NodeId, to: NodeId) -> Result<()> {
        let mut inner = self.inner.lock();
        for id in [from, to] {
            if !inner.nodes.contains_key(&id) {
                return Err(Error::Graph(format!("Cannot connect missing {id}")));
            }
        }
        if !inner.edges.contains(&(from, to)) {
            inner.edges.push((from, to));
        }
        Ok(())
    }

    fn disconnect(&self, node: NodeId) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.nodes.get_mut(&node) else {
            return false;
        };
        entry.released = true;
        inner.edges.retain(|&(from, _)| from != node);
        Self::collect_released(&mut inner, &self.event_tx);
        true
    }

    fn set_param(&self, node: NodeId, param: Param, value: f32) -> Result<()> {
        let mut inner = self.inner.lock();
        let kind = inner.node_mut(node)?;
        let name = kind.name();
        kind.param_mut(param)
            .ok_or_else(|| Error::Graph(format!("{node} ({name}) has no {param:?} parameter")))?
            .set(value);
        Ok(())
    }

    fn linear_ramp_to(&self, node: NodeId, param: Param, value: f32, end_time: f64) -> Result<()> {
        let mut inner = self.inner.lock();
        let now = inner.now(self.sample_rate);
        let kind = inner.node_mut(node)?;
        let name = kind.name();
        kind.param_mut(param)
            .ok_or_else(|| Error::Graph(format!("{node} ({name}) has no {param:?} parameter")))?
            .ramp_to(value, now, end_time);
        Ok(())
    }

    fn start(&self, node: NodeId, when: f64, offset: f64) -> Result<()> {
        let mut inner = self.inner.lock();
        let source = inner.source_mut(node)?;
        if source.is_started() {
            return Err(Error::Graph(format!("{node} was already started")));
        }
        source.start(when, offset);
        Ok(())
    }

    fn stop(&self, node: NodeId, when: f64) -> Result<()> {
        self.inner.lock().source_mut(node)?.stop(when);
        Ok(())
    }

    fn analyser_data(&self, node: NodeId) -> Option<Vec<f32>> {
        match &self.inner.lock().nodes.get(&node)?.kind {
            NodeKind::Analyser(analyser) => Some(analyser.snapshot()),
            _ => None,
        }
    }

    fn decode(&self, data: Bytes) -> impl Future<Output = Result<AudioBuffer>> + Send {
        let sample_rate = self.sample_rate;
        async move {
            tokio::task::spawn_blocking(move || crate::decode::decode_to_buffer(&data, sample_rate))
                .await
                .map_err(|e| Error::Internal(format!("Decode task failed: {e}")))?
        }
    }

    fn events(&self) -> Receiver<GraphEvent> {
        self.event_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(frames: usize, value: f32) -> AudioBuffer {
        AudioBuffer::new(100, 1, vec![value; frames])
    }

    fn running(channels: u16) -> SoftwareGraph {
        let graph = SoftwareGraph::new(100, channels);
        graph.resume();
        graph
    }

    #[test]
    fn test_clock_frozen_while_suspended() {
        let graph = SoftwareGraph::new(100, 2);
        graph.advance(1.0);
        assert!(graph.current_time().abs() < f64::EPSILON);

        graph.resume();
        graph.advance(0.5);
        assert!((graph.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_source_through_gain_to_destination() {
        let graph = running(1);
        let source = graph.create_buffer_source(constant(100, 1.0));
        let gain = graph.create_gain(0.5);
        graph.connect(source, gain).unwrap();
        graph.connect(gain, graph.destination()).unwrap();
        graph.start(source, 0.0, 0.0).unwrap();

        let mut out = vec![0.0; 4];
        graph.render(&mut out);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_shared_node_feeds_two_paths() {
        let graph = running(1);
        let source = graph.create_buffer_source(constant(100, 1.0));
        let a = graph.create_gain(1.0);
        let b = graph.create_gain(1.0);
        graph.connect(source, a).unwrap();
        graph.connect(source, b).unwrap();
        graph.connect(a, graph.destination()).unwrap();
        graph.connect(b, graph.destination()).unwrap();
        graph.start(source, 0.0, 0.0).unwrap();

        let mut out = vec![0.0; 4];
        graph.render(&mut out);
        assert!(out.iter().all(|&s| (s - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_ended_source_disposes_itself() {
        let graph = running(2);
        let events = graph.events();
        let source = graph.create_buffer_source(constant(10, 1.0));
        graph.connect(source, graph.destination()).unwrap();
        graph.start(source, 0.0, 0.0).unwrap();

        graph.advance(0.5);
        assert!(!graph.contains(source));
        assert_eq!(graph.source_count(), 0);
        assert_eq!(events.try_recv().unwrap(), GraphEvent::SourceEnded(source));
    }

    #[test]
    fn test_disconnect_collects_unfed_chain() {
        let graph = running(2);
        let source = graph.create_buffer_source(constant(1000, 1.0));
        let gain = graph.create_gain(1.0);
        graph.connect(source, gain).unwrap();
        graph.connect(gain, graph.destination()).unwrap();

        assert!(graph.disconnect(gain));
        // Still fed by the source.
        assert!(graph.contains(gain));
        assert!(graph.disconnect(source));
        assert!(!graph.contains(source));
        assert!(!graph.contains(gain));
        assert_eq!(graph.node_count(), 1);
        assert!(!graph.disconnect(source));
    }

    #[test]
    fn test_delay_node_shifts_signal() {
        let graph = running(1);
        let source = graph.create_buffer_source(constant(100, 1.0));
        let delay = graph.create_delay(1.0);
        graph.set_param(delay, Param::DelayTime, 0.02).unwrap();
        graph.connect(source, delay).unwrap();
        graph.connect(delay, graph.destination()).unwrap();
        graph.start(source, 0.0, 0.0).unwrap();

        let mut out = vec![0.0; 4];
        graph.render(&mut out);
        assert_eq!(graph.delay_frames(delay), Some(2));
        assert!(out[0].abs() < 1e-6 && out[1].abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_stop_in_future_keeps_playing_until_then() {
        let graph = running(1);
        let source = graph.create_buffer_source(constant(1000, 1.0));
        graph.connect(source, graph.destination()).unwrap();
        graph.start(source, 0.0, 0.0).unwrap();
        graph.stop(source, 0.1).unwrap();

        graph.advance(0.05);
        assert!(graph.contains(source));
        graph.advance(0.1);
        assert!(!graph.contains(source));
    }

    #[test]
    fn test_start_twice_fails() {
        let graph = running(1);
        let source = graph.create_buffer_source(constant(10, 1.0));
        graph.start(source, 0.0, 0.0).unwrap();
        assert!(graph.start(source, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_param_errors() {
        let graph = running(1);
        let gain = graph.create_gain(1.0);
        assert!(graph.set_param(gain, Param::DelayTime, 0.1).is_err());
        assert!(graph.start(gain, 0.0, 0.0).is_err());
        assert!(graph
            .linear_ramp_to(NodeId(999), Param::Gain, 0.0, 1.0)
            .is_err());
    }
}
