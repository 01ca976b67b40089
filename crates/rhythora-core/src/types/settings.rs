//! User settings schema.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Fullscreen behavior when entering gameplay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AutoFullscreen {
    #[default]
    Off,
    On,
}

/// Persisted user settings.
///
/// Volumes are in `[0, 1]`; offsets are signed milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub music_volume: f32,
    pub hitsounds_volume: f32,
    pub sound_effects_volume: f32,
    /// Negative when the player hears audio late, positive when early.
    pub audio_latency_offset_ms: f64,
    /// Consumed by gameplay judgment, not by the audio engine.
    pub input_latency_offset_ms: f64,
    pub auto_fullscreen: AutoFullscreen,
    pub fps_counter: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            music_volume: 1.0,
            hitsounds_volume: 1.0,
            sound_effects_volume: 1.0,
            audio_latency_offset_ms: 0.0,
            input_latency_offset_ms: 0.0,
            auto_fullscreen: AutoFullscreen::Off,
            fps_counter: false,
        }
    }
}

impl UserSettings {
    /// Names of every field in the serialized schema.
    pub fn schema_keys() -> Vec<String> {
        match serde_json::to_value(Self::default()) {
            Ok(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

/// Settings record shared between the settings bridge and the audio engine.
pub type SharedSettings = Arc<RwLock<UserSettings>>;
