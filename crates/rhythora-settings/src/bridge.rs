//! Applies user settings to the audio engine and persists them.

use std::sync::Arc;

use rhythora_audio::{AudioEngine, AudioGraph, Channel};
use rhythora_core::{AutoFullscreen, SharedSettings, UserSettings};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::store::SettingsStore;

/// Store key holding the serialized [`UserSettings`].
pub const SETTINGS_KEY: &str = "userSettings";

/// Fade applied when a volume slider moves.
pub const SETTINGS_FADE_SECONDS: f64 = 0.2;

/// A single user-facing settings edit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingChange {
    MusicVolume(f32),
    HitsoundsVolume(f32),
    SoundEffectsVolume(f32),
    AudioLatencyOffsetMs(f64),
    InputLatencyOffsetMs(f64),
    AutoFullscreen(AutoFullscreen),
    FpsCounter(bool),
}

impl SettingChange {
    /// Serialized field name of the setting.
    pub const fn key(self) -> &'static str {
        match self {
            Self::MusicVolume(_) => "musicVolume",
            Self::HitsoundsVolume(_) => "hitsoundsVolume",
            Self::SoundEffectsVolume(_) => "soundEffectsVolume",
            Self::AudioLatencyOffsetMs(_) => "audioLatencyOffsetMs",
            Self::InputLatencyOffsetMs(_) => "inputLatencyOffsetMs",
            Self::AutoFullscreen(_) => "autoFullscreen",
            Self::FpsCounter(_) => "fpsCounter",
        }
    }

    fn clamped(self) -> Self {
        match self {
            Self::MusicVolume(v) => Self::MusicVolume(clamp_volume(v)),
            Self::HitsoundsVolume(v) => Self::HitsoundsVolume(clamp_volume(v)),
            Self::SoundEffectsVolume(v) => Self::SoundEffectsVolume(clamp_volume(v)),
            other => other,
        }
    }

    fn write_into(self, settings: &mut UserSettings) {
        match self {
            Self::MusicVolume(v) => settings.music_volume = v,
            Self::HitsoundsVolume(v) => settings.hitsounds_volume = v,
            Self::SoundEffectsVolume(v) => settings.sound_effects_volume = v,
            Self::AudioLatencyOffsetMs(ms) => settings.audio_latency_offset_ms = ms,
            Self::InputLatencyOffsetMs(ms) => settings.input_latency_offset_ms = ms,
            Self::AutoFullscreen(mode) => settings.auto_fullscreen = mode,
            Self::FpsCounter(on) => settings.fps_counter = on,
        }
    }
}

fn clamp_volume(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// The only writer of the shared settings record.
pub struct SettingsBridge<G: AudioGraph, S: SettingsStore> {
    engine: Arc<AudioEngine<G>>,
    store: S,
    settings: SharedSettings,
}

impl<G: AudioGraph, S: SettingsStore> SettingsBridge<G, S> {
    /// Bridge over the settings record the engine reads from.
    pub fn new(engine: Arc<AudioEngine<G>>, store: S) -> Self {
        let settings = engine.settings().clone();
        Self {
            engine,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> UserSettings {
        self.settings.read().clone()
    }

    /// Record `change`, apply its audio side effect, and optionally persist
    /// the whole settings record.
    ///
    /// Returns `false` only when persisting failed.
    pub fn apply(&self, change: SettingChange, persist: bool) -> bool {
        let change = change.clamped();
        change.write_into(&mut self.settings.write());
        debug!("Setting {} changed: {change:?}", change.key());

        match change {
            SettingChange::MusicVolume(v) => {
                self.engine
                    .set_volume(Channel::Music, v, SETTINGS_FADE_SECONDS);
            }
            SettingChange::HitsoundsVolume(v) => {
                self.engine
                    .set_volume(Channel::Hitsounds, v, SETTINGS_FADE_SECONDS);
            }
            SettingChange::SoundEffectsVolume(v) => {
                self.engine
                    .set_volume(Channel::SoundEffects, v, SETTINGS_FADE_SECONDS);
            }
            SettingChange::AudioLatencyOffsetMs(ms) => {
                self.engine.set_latency_offset_ms(ms);
            }
            SettingChange::InputLatencyOffsetMs(_)
            | SettingChange::AutoFullscreen(_)
            | SettingChange::FpsCounter(_) => {}
        }

        !persist || self.persist()
    }

    /// Write the current settings record to the store.
    pub fn persist(&self) -> bool {
        let json = match serde_json::to_string(&*self.settings.read()) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize settings: {e}");
                return false;
            }
        };
        match self.store.set(SETTINGS_KEY, &json) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to persist settings: {e}");
                false
            }
        }
    }

    /// Load settings from the store over the defaults.
    ///
    /// Unknown keys are ignored and values of the wrong type are skipped.
    /// The result replaces the shared record and, once the engine is
    /// initialized, is applied to it immediately.
    pub fn restore(&self) -> UserSettings {
        let mut settings = self.load_stored();
        settings.music_volume = clamp_volume(settings.music_volume);
        settings.hitsounds_volume = clamp_volume(settings.hitsounds_volume);
        settings.sound_effects_volume = clamp_volume(settings.sound_effects_volume);

        *self.settings.write() = settings.clone();
        if self.engine.is_initialized() {
            self.push_to_engine(&settings);
        }
        info!("Settings restored");
        settings
    }

    fn load_stored(&self) -> UserSettings {
        let stored = match self.store.get(SETTINGS_KEY) {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                debug!("No stored settings, using defaults");
                return UserSettings::default();
            }
            Err(e) => {
                warn!("Failed to read stored settings: {e}");
                return UserSettings::default();
            }
        };
        let stored = match serde_json::from_str::<Value>(&stored) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!("Stored settings are not an object: {other}");
                return UserSettings::default();
            }
            Err(e) => {
                warn!("Stored settings are unreadable: {e}");
                return UserSettings::default();
            }
        };

        let mut merged = match serde_json::to_value(UserSettings::default()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let schema = UserSettings::schema_keys();
        for (key, value) in stored {
            if !schema.contains(&key) {
                debug!("Ignoring unknown setting {key}");
                continue;
            }
            let mut candidate = merged.clone();
            candidate.insert(key.clone(), value);
            match serde_json::from_value::<UserSettings>(Value::Object(candidate.clone())) {
                Ok(_) => merged = candidate,
                Err(e) => warn!("Skipping setting {key}: {e}"),
            }
        }

        serde_json::from_value(Value::Object(merged)).unwrap_or_default()
    }

    /// Apply every audio-related setting to the engine without fading.
    pub fn push_to_engine(&self, settings: &UserSettings) {
        self.engine
            .set_volume(Channel::Music, settings.music_volume, 0.0);
        self.engine
            .set_volume(Channel::Hitsounds, settings.hitsounds_volume, 0.0);
        self.engine
            .set_volume(Channel::SoundEffects, settings.sound_effects_volume, 0.0);
        self.engine
            .set_latency_offset_ms(settings.audio_latency_offset_ms);
    }
}
