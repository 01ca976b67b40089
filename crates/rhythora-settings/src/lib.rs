//! # rhythora-settings
//!
//! Persistent user settings for Rhythora.
//!
//! Settings are stored as one JSON document in a key/value table (`SQLite`
//! on disk, or in memory) and pushed into the audio engine as they change.

pub mod bridge;
pub mod store;

pub use bridge::{SettingChange, SettingsBridge, SETTINGS_FADE_SECONDS, SETTINGS_KEY};
pub use store::{MemoryStore, SettingsStore, SqliteStore};
