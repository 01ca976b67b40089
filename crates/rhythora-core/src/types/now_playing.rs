//! The shared "now playing" record.

use std::sync::Arc;

use parking_lot::RwLock;

use super::SongDescriptor;

/// Music player state observed by the UI and the gameplay note scheduler.
///
/// Only the session controller writes to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MusicPlayerData {
    /// The loaded song, `None` before anything has loaded.
    pub song: Option<SongDescriptor>,
    pub is_playing: bool,
    /// Engine clock reading at song position zero. Valid while playing.
    pub logical_start_time: f64,
    /// Song position at the moment of pausing, `None` when not paused.
    pub pause_time: Option<f64>,
}

impl MusicPlayerData {
    /// Song position in seconds given the current engine clock reading.
    ///
    /// Returns `None` when there is neither a running nor a paused song.
    pub fn position_at(&self, now: f64) -> Option<f64> {
        if self.is_playing {
            Some(now - self.logical_start_time)
        } else {
            self.pause_time
        }
    }

    /// Forget playback timing; the song descriptor is kept.
    pub fn mark_stopped(&mut self) {
        self.logical_start_time = 0.0;
        self.pause_time = None;
        self.is_playing = false;
    }
}

/// Now-playing record shared across the engine and its observers.
pub type SharedMusicPlayerData = Arc<RwLock<MusicPlayerData>>;
