//! Music session control: loading, swapping, pausing and resuming tracks.
//!
//! Loads may overlap. Each call to [`MusicSessionController::load_and_play`]
//! takes a new generation number, and a load only takes effect if no newer
//! one was started while it was fetching and decoding.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::seq::IndexedRandom;
use rhythora_core::{
    Result, SharedMusicPlayerData, SongDescriptor, WaitingCounter, BACKGROUND_MUSIC,
};
use tracing::{debug, error, info, warn};

use crate::engine::AudioEngine;
use crate::fetch::Fetch;
use crate::graph::{AudioBuffer, AudioGraph};

/// Drives the music bed and keeps the shared now-playing record in sync.
pub struct MusicSessionController<G: AudioGraph, F: Fetch> {
    engine: Arc<AudioEngine<G>>,
    fetcher: Arc<F>,
    now_playing: SharedMusicPlayerData,
    waiting: WaitingCounter,
    latest_load: AtomicU64,
}

impl<G: AudioGraph, F: Fetch> MusicSessionController<G, F> {
    pub fn new(
        engine: Arc<AudioEngine<G>>,
        fetcher: Arc<F>,
        now_playing: SharedMusicPlayerData,
        waiting: WaitingCounter,
    ) -> Self {
        Self {
            engine,
            fetcher,
            now_playing,
            waiting,
            latest_load: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &Arc<AudioEngine<G>> {
        &self.engine
    }

    pub fn now_playing(&self) -> &SharedMusicPlayerData {
        &self.now_playing
    }

    pub fn waiting(&self) -> &WaitingCounter {
        &self.waiting
    }

    /// Replace the current track with `song`.
    ///
    /// The current track fades out over `fade_out` right away. The new one
    /// fades in over `fade_in` (negative: no fade) and starts if `play`,
    /// otherwise it is left paused at the beginning. Returns `false` if the
    /// load failed or a newer load was started in the meantime.
    pub async fn load_and_play(
        &self,
        song: SongDescriptor,
        play: bool,
        fade_out: f64,
        fade_in: f64,
    ) -> bool {
        if !self.engine.ensure_running() {
            error!("Audio engine unavailable, cannot load {}", song.name);
            return false;
        }

        let token = self.latest_load.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Loading {} (load #{token})", song.name);

        if self.engine.release_music_source(fade_out) {
            self.now_playing.write().mark_stopped();
        }

        let buffer = match self.fetch_and_decode(&song.audio_url).await {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Failed to load {}: {e}", song.name);
                return false;
            }
        };

        if self.latest_load.load(Ordering::SeqCst) != token {
            debug!("Load #{token} of {} superseded, discarding", song.name);
            return false;
        }

        // Another release may have raced in a source since the first one.
        self.engine.release_music_source(fade_out);
        if !self.engine.create_music_source(Some(buffer), play, fade_in) {
            return false;
        }

        let now = self.engine.current_time().unwrap_or_default();
        let mut record = self.now_playing.write();
        info!("Now playing: {} by {}", song.name, song.author);
        record.song = Some(song);
        record.logical_start_time = now;
        if play {
            record.pause_time = None;
            record.is_playing = true;
        } else {
            record.pause_time = Some(0.0);
            record.is_playing = false;
        }
        true
    }

    async fn fetch_and_decode(&self, location: &str) -> Result<AudioBuffer> {
        let _wait = self.waiting.begin();
        let data = self.fetcher.fetch(location).await?;
        self.engine.graph().decode(data).await
    }

    /// Pause the playing track, fading out over `fade_out`.
    pub fn pause(&self, fade_out: f64) -> bool {
        let Some(now) = self.engine.current_time() else {
            return false;
        };
        {
            let record = self.now_playing.read();
            if record.song.is_none() || !record.is_playing {
                debug!("Nothing playing to pause");
                return false;
            }
        }
        if !self.engine.release_music_source(fade_out) {
            return false;
        }

        let mut record = self.now_playing.write();
        let position = (now - record.logical_start_time).max(0.0);
        record.pause_time = Some(position);
        record.is_playing = false;
        debug!("Paused at {position:.3}s");
        true
    }

    /// Resume a paused track where it stopped, fading in over `fade_in`.
    pub fn resume(&self, fade_in: f64) -> bool {
        let pause_time = {
            let record = self.now_playing.read();
            if record.song.is_none() || record.is_playing {
                debug!("Nothing paused to resume");
                return false;
            }
            let Some(pause_time) = record.pause_time else {
                debug!("Track is not paused");
                return false;
            };
            pause_time
        };

        // A track loaded without playing still holds an idle source.
        self.engine.release_music_source(-1.0);
        if !self
            .engine
            .create_music_source_at(None, true, fade_in, pause_time)
        {
            return false;
        }

        let now = self.engine.current_time().unwrap_or_default();
        let mut record = self.now_playing.write();
        record.logical_start_time = now - pause_time;
        record.pause_time = None;
        record.is_playing = true;
        debug!("Resumed at {pause_time:.3}s");
        true
    }

    /// Uniformly random track from `catalog`.
    pub fn pick_random_track(catalog: &[SongDescriptor]) -> Option<&SongDescriptor> {
        catalog.choose(&mut rand::rng())
    }

    /// Load and play a random background track, fading both ways over `fade`.
    pub async fn play_random(&self, fade: f64) -> bool {
        let Some(track) = Self::pick_random_track(&BACKGROUND_MUSIC).cloned() else {
            return false;
        };
        self.load_and_play(track, true, fade, fade).await
    }

    /// Song position in seconds for note timing, `None` if nothing is loaded
    /// or the track is still loading.
    pub fn song_position(&self) -> Option<f64> {
        let now = self.engine.current_time()?;
        let record = self.now_playing.read();
        record.song.as_ref()?;
        record.position_at(now)
    }
}
