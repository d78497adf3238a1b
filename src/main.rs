use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use rpg_audio_engine::audio_system::FsFileService;
use rpg_audio_engine::{AudioEngine, EngineConfig, EngineEvent};

/// Frame period of the update loop (about 60 Hz)
const FRAME: Duration = Duration::from_millis(16);

const FADE_OUT_MS: u64 = 2000;

/// Fade out after this long even if the track never looped
const MAX_PLAY: Duration = Duration::from_secs(30);

fn main() -> Result<()> {
    initialize_tracing();

    let args: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    let Some((music, effects)) = args.split_first() else {
        bail!("usage: rpg-audio-play <music> [sound effect...]");
    };

    let config = EngineConfig::load().context("Failed to load engine config")?;
    tracing::info!("Config: {}", EngineConfig::config_path_display());

    let mut engine = AudioEngine::builder(config)
        .with_file_service(std::sync::Arc::new(FsFileService::new()))
        .build()
        .context("Failed to start audio engine")?;
    let (events, _subscription) = engine.subscribe();

    engine
        .try_play_music(music, 100, 100, 1000)
        .with_context(|| format!("Failed to play {}", music.display()))?;

    // Fire one effect per second while the music plays
    let started = Instant::now();
    let mut fired = 0;
    let mut fade_started: Option<Instant> = None;
    loop {
        engine.update_from_clock();

        if fired < effects.len() && started.elapsed() >= Duration::from_secs(fired as u64 + 1) {
            engine.play_sound_effect(&effects[fired], 100, 100);
            fired += 1;
        }

        for event in events.try_iter() {
            match event {
                EngineEvent::MusicLooped { loop_count } => {
                    tracing::info!("Music looped ({})", loop_count);
                }
                EngineEvent::MusicHardwareFailure { message } => {
                    bail!("Music output failed: {}", message);
                }
                EngineEvent::SoundEffectDropped { path, reason } => {
                    tracing::warn!("Dropped {}: {:?}", path.display(), reason);
                }
                _ => {}
            }
        }

        match fade_started {
            None if fired == effects.len()
                && (engine.music_played_once() || started.elapsed() >= MAX_PLAY) =>
            {
                tracing::info!("Fading out after {:?}", started.elapsed());
                engine.fade_music_out(FADE_OUT_MS);
                fade_started = Some(Instant::now());
            }
            Some(at) if at.elapsed() >= Duration::from_millis(FADE_OUT_MS) => break,
            _ => {}
        }

        thread::sleep(FRAME);
    }

    engine.shutdown();
    Ok(())
}

fn initialize_tracing() {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Get log directory in user config folder
    let log_dir = dirs::config_dir()
        .map(|dir| dir.join("RpgAudioEngine").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "rpg-audio.log");

    // Configure filter (info level by default)
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);

    // In debug builds, also log to console
    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false)
            .with_thread_names(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Log directory: {}", log_dir.display());
}
