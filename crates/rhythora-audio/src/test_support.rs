//! Fixtures shared by the engine, session and sound bank tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use rhythora_core::{Error, Result};
use tokio::sync::Notify;

use crate::fetch::Fetch;

/// 16-bit PCM WAV file containing a quiet sine tone.
pub fn wav_bytes(sample_rate: u32, channels: u16, seconds: f64) -> Bytes {
    let frames = (seconds * f64::from(sample_rate)) as u32;
    let data_len = frames * u32::from(channels) * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * u32::from(channels) * 2).to_le_bytes());
    out.extend_from_slice(&(channels * 2).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for frame in 0..frames {
        let phase = f64::from(frame) / f64::from(sample_rate) * 440.0 * std::f64::consts::TAU;
        let sample = (phase.sin() * 8000.0) as i16;
        for _ in 0..channels {
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
    Bytes::from(out)
}

/// In-memory fetcher whose responses can be held back until released.
#[derive(Default)]
pub struct MemoryFetcher {
    files: Mutex<HashMap<String, Bytes>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, location: &str, data: Bytes) {
        self.files.lock().insert(location.to_string(), data);
    }

    /// Hold every fetch of `location` until the returned handle is notified.
    pub fn gate(&self, location: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .insert(location.to_string(), notify.clone());
        notify
    }

    /// Locations requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl Fetch for MemoryFetcher {
    fn fetch(&self, location: &str) -> impl Future<Output = Result<Bytes>> + Send {
        self.requests.lock().push(location.to_string());
        let gate = self.gates.lock().get(location).cloned();
        let data = self
            .files
            .lock()
            .get(location)
            .cloned()
            .ok_or_else(|| Error::Network(format!("404: {location}")));
        async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            data
        }
    }
}
