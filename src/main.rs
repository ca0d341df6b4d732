use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;

use track_recorder_rs::{
    Ack, EngineEvent, GeoFix, LiveStatus, ManualClock, MonotonicClock, Outcome, TrackEngine,
    TrackerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "track_recorder")]
#[command(about = "Replay a recorded fix log through the track recording engine", long_about = None)]
struct Args {
    /// Fix log: JSON array of fixes, {"fixes": [...]}, or a motion tracker
    /// comparison log with gps readings. `.gz` is decompressed.
    #[arg(long)]
    log: PathBuf,

    /// JSON engine configuration (defaults apply to missing fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the validator's accuracy threshold (meters)
    #[arg(long)]
    max_accuracy: Option<f64>,

    /// Override the track buffer capacity (points)
    #[arg(long)]
    buffer_capacity: Option<usize>,

    /// Pause the session once replay time reaches these seconds
    #[arg(long, value_delimiter = ',')]
    pause_at: Vec<f64>,

    /// Resume the session once replay time reaches these seconds
    #[arg(long, value_delimiter = ',')]
    resume_at: Vec<f64>,

    /// Write the summary (and status) JSON here
    #[arg(long)]
    output: Option<PathBuf>,

    /// Include the retained path in the JSON summary
    #[arg(long, default_value_t = false)]
    include_path: bool,
}

#[derive(Deserialize)]
struct GpsReading {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    accuracy: Option<f64>,
}

#[derive(Deserialize)]
struct Reading {
    timestamp: f64,
    #[serde(default)]
    gps: Option<GpsReading>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LogFile {
    Fixes(Vec<GeoFix>),
    Wrapped { fixes: Vec<GeoFix> },
    Comparison { readings: Vec<Reading> },
}

impl LogFile {
    fn into_fixes(self) -> Vec<GeoFix> {
        match self {
            LogFile::Fixes(fixes) | LogFile::Wrapped { fixes } => fixes,
            LogFile::Comparison { readings } => {
                let mut fixes: Vec<GeoFix> = Vec::new();
                for r in readings {
                    let Some(gps) = r.gps else { continue };
                    // Comparison logs repeat the latest fix on every IMU row
                    let repeated = fixes.last().is_some_and(|f| {
                        f.latitude == gps.latitude && f.longitude == gps.longitude
                    });
                    if repeated {
                        continue;
                    }
                    fixes.push(GeoFix {
                        latitude: gps.latitude,
                        longitude: gps.longitude,
                        timestamp: r.timestamp,
                        accuracy_m: gps.accuracy,
                    });
                }
                fixes
            }
        }
    }
}

fn load_log(path: &Path) -> Result<Vec<GeoFix>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader: Box<dyn Read> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(flate2::read::GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let log: LogFile = serde_json::from_reader(BufReader::new(reader))
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(log.into_fixes())
}

fn load_config(args: &Args) -> Result<TrackerConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };
    if let Some(max_accuracy) = args.max_accuracy {
        config.validator.max_accuracy_m = max_accuracy;
    }
    if let Some(capacity) = args.buffer_capacity {
        config.buffer_capacity = capacity;
    }
    config.validate()?;
    Ok(config)
}

/// Control events merged into the replay timeline, sorted by time
fn control_schedule(args: &Args) -> Result<Vec<(f64, EngineEvent)>> {
    if args.pause_at.len() != args.resume_at.len() {
        bail!("--pause-at and --resume-at must be given in pairs");
    }
    let mut schedule: Vec<(f64, EngineEvent)> = args
        .pause_at
        .iter()
        .map(|t| (*t, EngineEvent::Pause))
        .chain(args.resume_at.iter().map(|t| (*t, EngineEvent::Resume)))
        .collect();
    schedule.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(schedule)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(&args)?;
    let fixes = load_log(&args.log)?;
    let Some(start_time) = fixes.iter().map(|f| f.timestamp).find(|t| t.is_finite()) else {
        bail!("{} contains no usable fixes", args.log.display());
    };
    let mut schedule = control_schedule(&args)?.into_iter().peekable();

    log::info!("Replaying {} fixes from {}", fixes.len(), args.log.display());

    // Replay time is the latest fix time seen, so stale fixes cannot rewind it
    let clock = ManualClock::new(start_time);
    let mut replay_time = start_time;
    let mut engine = TrackEngine::new(config, Arc::new(clock.clone()))?;
    let session_id = engine.start()?;

    let mut acks = (0u64, 0u64, 0u64);
    for fix in &fixes {
        if fix.timestamp.is_finite() && fix.timestamp > replay_time {
            replay_time = fix.timestamp;
        }
        while let Some((at, event)) = schedule.next_if(|(at, _)| *at <= replay_time) {
            clock.set(at.max(clock.now()));
            if let Err(e) = engine.apply(event) {
                log::warn!("{:?} at {:.1}s ignored: {}", event, at, e);
            }
        }
        clock.set(replay_time);

        match engine.apply(EngineEvent::Fix(*fix))? {
            Outcome::Ingested(Ack::Accepted) => acks.0 += 1,
            Outcome::Ingested(Ack::Rejected(_)) => acks.1 += 1,
            Outcome::Ingested(Ack::Dropped) => acks.2 += 1,
            _ => {}
        }
    }

    let final_snapshot = engine.stop()?;
    let status = LiveStatus::from_snapshot(&final_snapshot);

    println!("\n=== Session {} ===", session_id);
    println!("Elapsed:  {}", final_snapshot.format_elapsed());
    println!("Distance: {}", final_snapshot.format_distance_km());
    println!(
        "Fixes:    {} accepted, {} rejected, {} dropped",
        acks.0, acks.1, acks.2
    );
    if let Some(buffer) = engine.session().map(|s| s.buffer()) {
        println!(
            "Path:     {} points retained of {} (stride {})",
            buffer.len(),
            buffer.total_appended(),
            buffer.stride()
        );
    }

    if let Some(output) = args.output.as_ref() {
        let mut summary = json!({
            "log": args.log.display().to_string(),
            "status": status,
            "stats": final_snapshot.stats,
        });
        if args.include_path {
            summary["path"] = serde_json::to_value(&final_snapshot.path)?;
        }
        std::fs::write(output, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("writing {}", output.display()))?;
        log::info!("Summary written to {}", output.display());
    }

    Ok(())
}
