//! Song descriptor for a playable music track.

use serde::{Deserialize, Serialize};

/// A music track that can be loaded by the session controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SongDescriptor {
    /// Track title.
    pub name: String,
    /// Composer/artist.
    pub author: String,
    /// Chart author.
    pub mapper: String,
    /// Where the audio file lives (absolute URL, asset path, or local path).
    pub audio_url: String,
    /// Track length in seconds.
    pub length: f64,
    /// Beats per minute.
    pub bpm: f64,
    /// Time of the first beat in seconds.
    pub offset: f64,
}

impl SongDescriptor {
    pub fn new(name: impl Into<String>, audio_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: String::new(),
            mapper: String::new(),
            audio_url: audio_url.into(),
            length: 0.0,
            bpm: 0.0,
            offset: 0.0,
        }
    }

    /// Seconds per beat, or `None` if the bpm is unknown.
    pub fn beat_length(&self) -> Option<f64> {
        (self.bpm > 0.0).then(|| 60.0 / self.bpm)
    }

    /// Convert a song position in seconds into a (fractional) beat index.
    ///
    /// Beat 0 lands on `offset`; positions before it give negative beats.
    pub fn beat_at(&self, position: f64) -> Option<f64> {
        self.beat_length()
            .map(|beat_length| (position - self.offset) / beat_length)
    }

    /// Inverse of [`Self::beat_at`].
    pub fn time_of_beat(&self, beat: f64) -> Option<f64> {
        self.beat_length()
            .map(|beat_length| beat.mul_add(beat_length, self.offset))
    }
}
