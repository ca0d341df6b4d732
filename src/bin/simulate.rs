use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration, Instant};

use track_recorder_rs::provider::mock_fix_loop;
use track_recorder_rs::{
    spawn_engine, LiveStatus, MockRoute, MonotonicClock, SystemClock, TrackEngine, TrackerConfig,
    WatchFlag,
};

#[derive(Parser, Debug)]
#[command(name = "simulate")]
#[command(about = "Drive the track recording engine from a simulated location provider", long_about = None)]
struct Args {
    /// Duration in seconds
    #[arg(value_name = "SECONDS", default_value = "30")]
    duration: u64,

    /// Milliseconds between simulated fixes
    #[arg(long, default_value = "1000")]
    fix_interval_ms: u64,

    /// Pause for this many seconds halfway through (0 = no pause)
    #[arg(long, default_value = "0")]
    pause_secs: u64,

    /// JSON engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for live_status.json
    #[arg(long, default_value = "track_recorder_sessions")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match args.config.as_ref() {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };
    std::fs::create_dir_all(&args.output_dir)?;

    log::info!("[{}] Track recorder simulation starting", ts_now());
    log::info!("  Duration: {} seconds", args.duration);
    log::info!("  Fix interval: {} ms", args.fix_interval_ms);
    log::info!("  Output Dir: {}", args.output_dir.display());

    let clock: Arc<dyn MonotonicClock> = Arc::new(SystemClock::new());
    let flag = WatchFlag::new();

    let mut engine = TrackEngine::new(config, Arc::clone(&clock))?;
    engine.set_location_provider(Box::new(flag.clone()));
    let (handle, engine_task) = spawn_engine(engine, 256);

    // Location provider: mock fixes flow only while the engine has it watching
    let (fix_tx, fix_rx) = mpsc::channel(100);
    let provider_task = tokio::spawn(mock_fix_loop(
        fix_tx,
        MockRoute::new(37.7749, -122.4194),
        Arc::clone(&clock),
        flag.clone(),
        Duration::from_millis(args.fix_interval_ms.max(1)),
    ));
    let forwarder = handle.forward_fixes(fix_rx);

    let session_id = handle.start().await?;
    log::info!("[{}] Session {} started", ts_now(), session_id);

    // Once-per-second display clock
    let tick_handle = handle.clone();
    let tick_task = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            match tick_handle.tick().await {
                Ok(snapshot) => log::info!(
                    "[{}] {} | {} | {} points",
                    ts_now(),
                    snapshot.format_elapsed(),
                    snapshot.format_distance_km(),
                    snapshot.path.len()
                ),
                Err(e) if e.is_transition_error() => break,
                Err(e) => {
                    log::error!("Tick failed: {}", e);
                    break;
                }
            }
        }
    });

    // Status file every 2 seconds
    let status_handle = handle.clone();
    let status_path = args.output_dir.join("live_status.json");
    let status_task = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(2));
        loop {
            ticker.tick().await;
            let status = match status_handle.snapshot().await {
                Ok(Some(snapshot)) => LiveStatus::from_snapshot(&snapshot),
                Ok(None) => LiveStatus::idle(),
                Err(_) => break,
            };
            if let Err(e) = status.save(&status_path) {
                log::warn!("Failed to write {}: {}", status_path.display(), e);
            }
        }
    });

    let total = Duration::from_secs(args.duration);
    let started = Instant::now();
    if args.pause_secs > 0 {
        sleep(total / 2).await;
        handle.pause().await?;
        log::info!("[{}] Paused for {}s", ts_now(), args.pause_secs);
        sleep(Duration::from_secs(args.pause_secs)).await;
        handle.resume().await?;
        log::info!("[{}] Resumed", ts_now());
    }
    let remaining = total.saturating_sub(started.elapsed());
    sleep(remaining).await;

    let final_snapshot = handle.stop().await?;
    tick_task.abort();
    status_task.abort();

    let final_status = LiveStatus::from_snapshot(&final_snapshot);
    let final_path = args.output_dir.join("live_status_final.json");
    final_status.save(&final_path)?;

    println!("\n=== Final Stats ===");
    println!("Session:  {}", final_snapshot.session_id);
    println!("Elapsed:  {}", final_snapshot.format_elapsed());
    println!("Distance: {}", final_snapshot.format_distance_km());
    println!(
        "Fixes:    {} accepted, {} rejected, {} dropped",
        final_snapshot.stats.accepted,
        final_snapshot.stats.rejected(),
        final_snapshot.stats.dropped
    );

    drop(handle);
    provider_task.abort();
    let _ = forwarder.await;
    let _ = engine_task.await;
    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
