//! Core domain types for Rhythora.

pub mod catalog;
pub mod now_playing;
pub mod settings;
pub mod song;
pub mod waiting;

pub use catalog::{SoundKey, BACKGROUND_MUSIC, SOUND_LIST};
pub use now_playing::{MusicPlayerData, SharedMusicPlayerData};
pub use settings::{AutoFullscreen, SharedSettings, UserSettings};
pub use song::SongDescriptor;
pub use waiting::{WaitGuard, WaitingCounter};
