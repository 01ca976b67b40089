//! Lazily loaded hitsounds and sound effects.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rhythora_core::{Result, SoundKey, WaitingCounter};
use tracing::{debug, info, trace, warn};

use crate::engine::{AudioEngine, Channel};
use crate::fetch::Fetch;
use crate::graph::{AudioBuffer, AudioGraph};

/// Cache of decoded one-shot sounds. Entries are never evicted.
pub struct SoundBank<G: AudioGraph, F: Fetch> {
    engine: Arc<AudioEngine<G>>,
    fetcher: Arc<F>,
    waiting: WaitingCounter,
    cache: Mutex<HashMap<SoundKey, AudioBuffer>>,
}

impl<G: AudioGraph, F: Fetch> SoundBank<G, F> {
    pub fn new(engine: Arc<AudioEngine<G>>, fetcher: Arc<F>, waiting: WaitingCounter) -> Self {
        Self {
            engine,
            fetcher,
            waiting,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_loaded(&self, key: SoundKey) -> bool {
        self.cache.lock().contains_key(&key)
    }

    /// Make sure `key` is decoded and cached.
    ///
    /// Fails before the engine is initialized. A failed load leaves the
    /// entry absent so a later call retries.
    pub async fn ensure_loaded(&self, key: SoundKey) -> bool {
        if !self.engine.is_initialized() {
            debug!("Cannot load {key} before the audio engine is initialized");
            return false;
        }
        if self.is_loaded(key) {
            return true;
        }

        match self.load(key).await {
            Ok(buffer) => {
                info!("Loaded sound {key} ({:.2}s)", buffer.duration());
                self.cache.lock().insert(key, buffer);
                true
            }
            Err(e) => {
                warn!("Failed to load sound {key}: {e}");
                false
            }
        }
    }

    /// [`Self::ensure_loaded`] by catalog name.
    pub async fn ensure_loaded_by_name(&self, name: &str) -> bool {
        let Some(key) = SoundKey::from_name(name) else {
            warn!("Unknown sound key: {name}");
            return false;
        };
        self.ensure_loaded(key).await
    }

    /// Load every catalog sound. Returns how many are now cached.
    pub async fn preload_all(&self) -> usize {
        let mut loaded = 0;
        for key in SoundKey::ALL {
            if self.ensure_loaded(key).await {
                loaded += 1;
            }
        }
        loaded
    }

    async fn load(&self, key: SoundKey) -> Result<AudioBuffer> {
        let _wait = self.waiting.begin();
        let data = self.fetcher.fetch(key.url()).await?;
        self.engine.graph().decode(data).await
    }

    /// Play a cached sound once on `channel`. Does nothing if `key` is not
    /// loaded yet.
    pub fn play(&self, key: SoundKey, channel: Channel) -> bool {
        let Some(buffer) = self.cache.lock().get(&key).cloned() else {
            trace!("Sound {key} not loaded, skipping");
            return false;
        };
        self.engine.play_one_shot(buffer, channel)
    }

    pub fn play_hitsound(&self, key: SoundKey) -> bool {
        self.play(key, Channel::Hitsounds)
    }

    pub fn play_sound_effect(&self, key: SoundKey) -> bool {
        self.play(key, Channel::SoundEffects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SoftwareGraph;
    use crate::test_support::{wav_bytes, MemoryFetcher};
    use bytes::Bytes;
    use parking_lot::RwLock;
    use rhythora_core::UserSettings;

    const HIT: SoundKey = SoundKey::StableNormalHitnormal;

    fn setup() -> (SoundBank<SoftwareGraph, MemoryFetcher>, Arc<MemoryFetcher>) {
        let graph = Arc::new(SoftwareGraph::new(8000, 2));
        let settings = Arc::new(RwLock::new(UserSettings::default()));
        let engine = Arc::new(AudioEngine::new(graph, settings));
        let fetcher = Arc::new(MemoryFetcher::new());
        let bank = SoundBank::new(engine, fetcher.clone(), WaitingCounter::new());
        (bank, fetcher)
    }

    #[tokio::test]
    async fn test_requires_initialized_engine() {
        let (bank, fetcher) = setup();
        fetcher.insert(HIT.url(), wav_bytes(8000, 1, 0.1));
        assert!(!bank.ensure_loaded(HIT).await);
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_loads_once_and_plays() {
        let (bank, fetcher) = setup();
        fetcher.insert(HIT.url(), wav_bytes(8000, 1, 0.1));
        bank.engine.initialize();

        assert!(!bank.play_hitsound(HIT));
        assert!(bank.ensure_loaded(HIT).await);
        assert!(bank.ensure_loaded_by_name("stable-normal-hitnormal").await);
        assert_eq!(fetcher.requests().len(), 1);
        assert!(bank.is_loaded(HIT));

        let graph = bank.engine.graph().clone();
        assert!(bank.play_hitsound(HIT));
        assert!(bank.play_sound_effect(HIT));
        assert_eq!(graph.source_count(), 2);

        graph.advance(0.2);
        assert_eq!(graph.source_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_entry_absent() {
        let (bank, fetcher) = setup();
        bank.engine.initialize();
        fetcher.insert(HIT.url(), Bytes::from_static(b"garbage"));

        assert!(!bank.ensure_loaded(HIT).await);
        assert!(!bank.is_loaded(HIT));
        assert_eq!(bank.waiting.count(), 0);

        fetcher.insert(HIT.url(), wav_bytes(8000, 1, 0.1));
        assert_eq!(bank.preload_all().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_name() {
        let (bank, _fetcher) = setup();
        bank.engine.initialize();
        assert!(!bank.ensure_loaded_by_name("drum-hitclap").await);
    }
}
