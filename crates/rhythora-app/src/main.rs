//! # Rhythora
//!
//! Hosts the audio engine on the default output device and plays the
//! background music rotation, ticking a hitsound on every beat.
//!
//! Usage: `rhythora [track name]`. Without a name a random track plays.
//!
//! Environment:
//! - `RHYTHORA_ASSET_BASE`: URL or directory that `/assets/...` resolves against
//! - `RHYTHORA_LATENCY_MS`: audio latency offset to apply and save
//! - `RUST_LOG`: log filter

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use rhythora_audio::{
    AudioEngine, AudioOutput, HttpFetcher, MusicSessionController, SoftwareGraph, SoundBank,
};
use rhythora_core::{
    SharedMusicPlayerData, SoundKey, UserSettings, WaitingCounter, BACKGROUND_MUSIC,
};
use rhythora_settings::{SettingChange, SettingsBridge, SqliteStore};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const FADE_SECONDS: f64 = 0.5;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rhythora=debug,rhythora_app=debug,rhythora_audio=info,rhythora_settings=info"
                    .into()
            }),
        )
        .init();

    info!("Starting Rhythora v{}", env!("CARGO_PKG_VERSION"));

    let mut output = AudioOutput::new().context("Failed to open audio output")?;
    let config = output.config();
    let graph = Arc::new(SoftwareGraph::new(config.sample_rate, config.channels));
    let settings = Arc::new(RwLock::new(UserSettings::default()));
    let engine = Arc::new(AudioEngine::new(graph.clone(), settings));

    let store = SqliteStore::new().context("Failed to open settings store")?;
    let bridge = SettingsBridge::new(engine.clone(), store);
    bridge.restore();
    if let Ok(value) = std::env::var("RHYTHORA_LATENCY_MS") {
        let ms: f64 = value
            .parse()
            .with_context(|| format!("Invalid RHYTHORA_LATENCY_MS: {value}"))?;
        if !bridge.apply(SettingChange::AudioLatencyOffsetMs(ms), true) {
            warn!("Latency offset applied but not saved");
        }
    }

    output.start(graph).context("Failed to start audio output")?;
    engine.initialize();

    let fetcher = Arc::new(match std::env::var("RHYTHORA_ASSET_BASE") {
        Ok(base) => HttpFetcher::with_base(&base).context("Invalid RHYTHORA_ASSET_BASE")?,
        Err(_) => HttpFetcher::new(),
    });
    let waiting = WaitingCounter::new();
    let session = MusicSessionController::new(
        engine.clone(),
        fetcher.clone(),
        SharedMusicPlayerData::default(),
        waiting.clone(),
    );
    let sounds = SoundBank::new(engine.clone(), fetcher, waiting);
    if sounds.preload_all().await < SoundKey::ALL.len() {
        warn!("Some sounds failed to load; beat ticks may be silent");
    }

    let started = match std::env::args().nth(1) {
        Some(name) => {
            let Some(song) = BACKGROUND_MUSIC.iter().find(|song| song.name == name) else {
                bail!("Unknown track: {name}");
            };
            session
                .load_and_play(song.clone(), true, FADE_SECONDS, FADE_SECONDS)
                .await
        }
        None => session.play_random(FADE_SECONDS).await,
    };
    if !started {
        bail!("Failed to start playback");
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(20));
    let mut last_beat: Option<i64> = None;
    let mut last_report = 0.0;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }
        engine.drain_events();

        let Some(position) = session.song_position() else {
            continue;
        };
        let song = session.now_playing().read().song.clone();
        let Some(song) = song else {
            continue;
        };
        if position >= song.length {
            info!("{} finished", song.name);
            if !session.play_random(FADE_SECONDS).await {
                warn!("Failed to start the next track");
            }
            last_beat = None;
            continue;
        }

        if let Some(beat) = song.beat_at(position).map(|beat| beat.floor() as i64) {
            if beat >= 0 && last_beat != Some(beat) {
                sounds.play_hitsound(SoundKey::StableNormalHitnormal);
                last_beat = Some(beat);
            }
        }
        if position - last_report >= 1.0 || position < last_report {
            info!("{} {position:.1}s / {:.0}s", song.name, song.length);
            last_report = position;
        }
    }

    info!("Shutting down");
    session.pause(FADE_SECONDS);
    tokio::time::sleep(Duration::from_secs_f64(FADE_SECONDS)).await;
    Ok(())
}
