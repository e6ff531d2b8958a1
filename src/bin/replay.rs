use std::path::{Path, PathBuf};

use clap::Parser;
use env_logger::Env;
use log::info;
use serde::Serialize;

use eco_tracker::config::TrackerConfig;
use eco_tracker::sensor_fusion::{MovementType, SensorFusionManager};
use eco_tracker::sensors::SessionLog;
use eco_tracker::trip::Trip;
use eco_tracker::trip_detection::{DetectionEvent, TripDetector};
use eco_tracker::types::SensorKind;

#[derive(Parser, Debug)]
struct Args {
    /// Path to a recorded session (.json or .json.gz)
    #[arg(long, conflicts_with = "session_dir")]
    log: Option<PathBuf>,

    /// Directory of sessions to batch replay
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the minimum trip distance, meters
    #[arg(long)]
    min_trip_distance_m: Option<f64>,

    /// Include full trip routes in the output
    #[arg(long, default_value_t = false)]
    with_routes: bool,
}

#[derive(Serialize)]
struct ClassificationChange {
    timestamp: f64,
    movement_type: MovementType,
    is_moving: bool,
}

#[derive(Serialize)]
struct ReplayResult {
    log: String,
    readings: usize,
    fixes: u64,
    fixes_skipped: u64,
    steps: u64,
    classification_changes: Vec<ClassificationChange>,
    trips: Vec<Trip>,
    trips_discarded: u64,
}

fn collect(events: Vec<DetectionEvent>, trips: &mut Vec<Trip>) {
    for event in events {
        match event {
            DetectionEvent::TripFinalized(trip) => {
                eprintln!(
                    "[TRIP] {} {:.2} km in {:.0}s ({:.1} km/h)",
                    trip.id, trip.distance_km, trip.duration_secs, trip.average_speed_kmh
                );
                trips.push(trip);
            }
            DetectionEvent::TrackingStarted { start_time, .. } => {
                eprintln!("[TRIP] tracking from t={:.1}", start_time);
            }
            DetectionEvent::TripDiscarded { points, distance_m } => {
                eprintln!("[TRIP] discarded ({} points, {:.0} m)", points, distance_m);
            }
            _ => {}
        }
    }
}

fn run_once(path: &Path, config: &TrackerConfig, with_routes: bool) -> anyhow::Result<ReplayResult> {
    let mut session = SessionLog::load(path)?;
    session
        .readings
        .sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut fusion = SensorFusionManager::new(config.motion.clone());
    if !session.has_gyro() {
        fusion.mark_unavailable(SensorKind::Gyroscope);
    }
    let mut detector = TripDetector::new(config.trip.clone());
    let mut changes = Vec::new();
    let mut trips = Vec::new();
    let mut fixes_skipped = 0;

    for reading in &session.readings {
        if let Some(accel) = &reading.accel {
            if let Some(change) = fusion.feed_accel(accel) {
                changes.push(ClassificationChange {
                    timestamp: accel.timestamp,
                    movement_type: change.movement_type,
                    is_moving: change.is_moving,
                });
            }
        }
        if let Some(gyro) = &reading.gyro {
            if let Some(change) = fusion.feed_gyro(gyro) {
                changes.push(ClassificationChange {
                    timestamp: gyro.timestamp,
                    movement_type: change.movement_type,
                    is_moving: change.is_moving,
                });
            }
        }
        match reading.fix() {
            Some(fix) => collect(detector.feed_location(fix), &mut trips),
            None if reading.gps.is_some() => fixes_skipped += 1,
            None => {}
        }
    }
    collect(detector.stop(None), &mut trips);

    if !with_routes {
        for trip in &mut trips {
            trip.route.clear();
        }
    }

    Ok(ReplayResult {
        log: path.display().to_string(),
        readings: session.readings.len(),
        fixes: detector.stats().fixes_processed,
        fixes_skipped,
        steps: fusion.step_count(),
        classification_changes: changes,
        trips,
        trips_discarded: detector.stats().trips_discarded,
    })
}

fn is_session_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    path.is_file() && (name.ends_with(".json") || name.ends_with(".json.gz"))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };
    if let Some(distance) = args.min_trip_distance_m {
        config.trip.min_trip_distance_m = distance;
    }
    config.validate()?;

    let mut results = Vec::new();
    if let Some(dir) = args.session_dir.as_ref() {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if is_session_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        for path in paths {
            match run_once(&path, &config, args.with_routes) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &config, args.with_routes)?);
    } else {
        anyhow::bail!("Provide --log or --session-dir");
    }

    info!("Replayed {} session(s)", results.len());
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
