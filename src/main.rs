use gifreel::cli::Args;
use gifreel::config::{self, PathConfig, Settings};
use gifreel::core::{IntervalClock, PlaybackDriver, PlaybackState, PressureMonitor, RunContext, WeakHandle};
use gifreel::entities::AnimatedImage;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use log::{debug, info};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::config_file("gifreel.log", path_config));
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// CLI flags override the settings file
fn apply_args(settings: &mut Settings, args: &Args) {
    if let Some(size) = args.cache_size {
        settings.cache.optimal_frame_cache_size = Some(size);
    }
    if args.no_predraw {
        settings.cache.predraw = false;
    }
    if let Some(fps) = args.fps {
        settings.playback.tick_hz = fps;
    }
    if let Some(policy) = args.miss_policy {
        settings.playback.miss_policy = policy.into();
    }
    if let Some(name) = &args.run_context {
        settings.playback.run_context = RunContext::new(name.clone());
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(|| config::config_file(config::SETTINGS_FILE, &path_config));
    let mut settings = Settings::load_or_default(&settings_path)?;
    apply_args(&mut settings, &args);
    debug!("Settings: {:?}", settings);

    let bytes = std::fs::read(&args.file_path)
        .with_context(|| format!("Failed to read {}", args.file_path.display()))?;
    let image = Arc::new(
        AnimatedImage::with_options(bytes, settings.cache.image_options())
            .with_context(|| format!("Failed to open {}", args.file_path.display()))?,
    );
    info!(
        "Playing {}: {} frames, {}x{}, loop_count={}",
        args.file_path.display(),
        image.frame_count(),
        image.size().0,
        image.size().1,
        image.loop_count()
    );

    let mut monitor = PressureMonitor::new(settings.memory.low_memory_mb);
    monitor.register(&image);

    let (finished_tx, finished_rx) = crossbeam_channel::bounded::<u32>(1);
    let driver = Arc::new(Mutex::new(PlaybackDriver::new()));
    {
        let mut d = driver.lock().unwrap_or_else(|e| e.into_inner());
        d.set_miss_policy(settings.playback.miss_policy);
        d.set_run_context(settings.playback.run_context.clone());
        d.set_image(Some(Arc::clone(&image)));
        d.set_on_loop_finished(move |remaining| {
            let _ = finished_tx.try_send(remaining);
        });
        d.start();
    }

    let clock = IntervalClock::spawn(
        WeakHandle::new(&driver),
        settings.playback.tick_interval(),
        settings.playback.run_context.clone(),
    )
    .context("Failed to start playback clock")?;

    let started = Instant::now();
    let limit = Duration::from_secs_f64(args.duration.max(0.0));
    let poll_interval = Duration::from_millis(settings.memory.poll_interval_ms.max(10));

    loop {
        let remaining = limit.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            info!("Duration limit reached");
            break;
        }
        match finished_rx.recv_timeout(remaining.min(poll_interval)) {
            Ok(_) => {
                info!("Animation finished");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if settings.memory.low_memory_mb > 0 {
            monitor.poll();
        }
        let index = driver.lock().unwrap_or_else(|e| e.into_inner()).current_frame_index();
        let sizes = image.cache_sizes();
        debug!(
            "Frame {} | cache {}/{} (effective {})",
            index, sizes.current, sizes.max, sizes.effective
        );
    }

    clock.stop();
    drop(clock);

    let (state, index) = {
        let d = driver.lock().unwrap_or_else(|e| e.into_inner());
        (d.state(), d.current_frame_index())
    };
    let stats = image.cache_stats();
    println!(
        "{}: {} after {:.2}s on frame {}/{}",
        args.file_path.display(),
        if state == PlaybackState::Finished { "finished" } else { "stopped" },
        started.elapsed().as_secs_f64(),
        index,
        image.frame_count()
    );
    println!(
        "cache: max {} | hits {} | misses {} | contended {} | decoded {} | failed {} | evicted {} | discarded {} | hit rate {:.1}%",
        image.frame_cache_size_max(),
        stats.hits,
        stats.misses,
        stats.contended,
        stats.decoded,
        stats.decode_failures,
        stats.evicted,
        stats.discarded,
        stats.hit_rate() * 100.0
    );
    Ok(())
}
