use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::{error, info, warn};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, Duration, Instant};

use eco_tracker::config::TrackerConfig;
use eco_tracker::event_bus::{classification_channel, TripBroadcast};
use eco_tracker::export::write_trip_files;
use eco_tracker::live_status::LiveStatus;
use eco_tracker::restart_manager::RestartPolicy;
use eco_tracker::sensor_fusion::{MotionSnapshot, MovementClassification, SensorFusionManager};
use eco_tracker::sensors::{
    self, CommuteScript, SensorMessage, SimulatedClock, SimulatedLocationProvider,
    TermuxLocationProvider,
};
use eco_tracker::service::{
    should_start_on_boot, supervise, LocationProvider, StaticPermission, StaticSession,
    TimedWakeLock, TripDetectionService,
};
use eco_tracker::transport::{confirm_trip, JsonLinesRepository, TransportRepository, TransportType};
use eco_tracker::types::LocationSample;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Source {
    /// termux-sensor / termux-location
    Termux,
    /// Scripted walk-then-ride commute
    Simulated,
}

#[derive(Parser, Debug)]
#[command(name = "eco_tracker")]
#[command(about = "Background trip and motion detection", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where sensor data and fixes come from
    #[arg(long, value_enum, default_value = "termux")]
    source: Source,

    /// Simulated seconds per wall-clock second
    #[arg(long, default_value = "10.0")]
    time_scale: f64,

    /// Enable gyroscope processing
    #[arg(long)]
    enable_gyro: bool,

    /// Output directory
    #[arg(long, default_value = "eco_tracker_sessions")]
    output_dir: PathBuf,

    /// Signed-in user; required for --on-boot and --confirm-as
    #[arg(long)]
    user: Option<String>,

    /// Confirm every detected trip with this transport type
    #[arg(long)]
    confirm_as: Option<TransportType>,

    /// Behave like a boot-time start: exit unless a user session exists
    #[arg(long)]
    on_boot: bool,

    /// Do not restart the detection service after a crash
    #[arg(long)]
    not_sticky: bool,

    /// Override the minimum trip distance, meters
    #[arg(long)]
    min_trip_distance_m: Option<f64>,

    /// Override the stationary timeout, seconds
    #[arg(long)]
    stationary_timeout_secs: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    if let Some(distance) = args.min_trip_distance_m {
        config.trip.min_trip_distance_m = distance;
    }
    if let Some(timeout) = args.stationary_timeout_secs {
        config.trip.stationary_timeout_secs = timeout;
    }
    config.validate()?;

    let session = StaticSession(args.user.clone());
    if args.on_boot && !should_start_on_boot(&session) {
        return Ok(());
    }
    if args.confirm_as.is_some() && args.user.is_none() {
        bail!("--confirm-as needs --user");
    }

    info!("[{}] EcoTracker starting", ts_now());
    info!("  Duration: {} seconds (0=continuous)", args.duration);
    info!("  Source: {:?}", args.source);
    info!("  Enable Gyro: {}", args.enable_gyro);
    info!("  Output Dir: {}", args.output_dir.display());
    std::fs::create_dir_all(&args.output_dir)?;

    // ── Motion classification ────────────────────────────────────────────
    let (sensor_tx, sensor_rx) = mpsc::channel::<SensorMessage>(500);
    let (class_tx, mut class_rx) = classification_channel();
    let fusion = SensorFusionManager::new(config.motion.clone());
    let (motion_tx, motion_rx) = watch::channel(fusion.snapshot());

    let script = CommuteScript::default();
    let provider: Arc<dyn LocationProvider> = match args.source {
        Source::Termux => {
            tokio::spawn(sensors::accel_loop(sensor_tx.clone()));
            tokio::spawn(sensors::gyro_loop(sensor_tx.clone(), args.enable_gyro));
            Arc::new(TermuxLocationProvider::new())
        }
        Source::Simulated => {
            let clock = SimulatedClock::new(sensors::current_timestamp(), args.time_scale);
            tokio::spawn(sensors::simulated_motion_loop(
                sensor_tx.clone(),
                script.clone(),
                clock.clone(),
                args.enable_gyro,
            ));
            let origin = LocationSample::new(45.4642, 9.19, clock.epoch(0.0));
            Arc::new(SimulatedLocationProvider::new(script, origin, clock).with_dropouts(9))
        }
    };
    drop(sensor_tx);
    let classifier = tokio::spawn(classifier_task(sensor_rx, fusion, class_tx, motion_tx));
    let class_logger = tokio::spawn(async move {
        while class_rx.changed().await.is_ok() {
            let change = *class_rx.borrow_and_update();
            info!(
                "[MOTION] {} (moving: {})",
                change.movement_type, change.is_moving
            );
        }
    });

    // ── Trip detection ───────────────────────────────────────────────────
    let service = TripDetectionService::new(
        provider,
        Arc::new(StaticPermission(true)),
        Arc::new(TimedWakeLock::new()),
    )
    .with_config(config.service.clone())
    .with_detection(config.trip.clone());
    let status_rx = service.subscribe_status();

    let trips_rx = service.bus().subscribe();
    let trip_writer = tokio::spawn(trip_consumer(
        trips_rx,
        args.output_dir.clone(),
        args.user.clone(),
        args.confirm_as,
    ));

    let policy = if args.not_sticky {
        RestartPolicy::NotSticky
    } else {
        RestartPolicy::Sticky
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let start = Instant::now();
    let deadline = (args.duration > 0).then(|| start + Duration::from_secs(args.duration));
    let status_path = args.output_dir.join("live_status.json");
    let mut status_tick = interval(Duration::from_secs(2));

    let outcome = {
        let supervisor = supervise(&service, policy, shutdown_rx);
        tokio::pin!(supervisor);
        loop {
            tokio::select! {
                result = &mut supervisor => break result,
                _ = tokio::signal::ctrl_c() => {
                    info!("[{}] Ctrl-C, stopping...", ts_now());
                    shutdown_tx.send_replace(true);
                }
                _ = sleep_until_deadline(deadline), if !*shutdown_tx.borrow() => {
                    info!("[{}] Duration reached, stopping...", ts_now());
                    shutdown_tx.send_replace(true);
                }
                _ = status_tick.tick() => {
                    let status = LiveStatus::new(
                        &status_rx.borrow(),
                        &motion_rx.borrow(),
                        start.elapsed().as_secs(),
                    );
                    if let Err(err) = status.save(&status_path) {
                        warn!("[STATUS] {}", err);
                    }
                }
            }
        }
    };

    match &outcome {
        Ok(report) => info!(
            "[{}] Detection finished: {} run(s), {} restart(s)",
            ts_now(),
            report.runs,
            report.restarts
        ),
        Err(err) => error!("[{}] Detection ended: {}", ts_now(), err),
    }

    // Dropping the service closes the bus once queued trips are delivered
    drop(service);
    let written = trip_writer.await.unwrap_or(0);
    classifier.abort();
    class_logger.abort();

    let final_status = LiveStatus::new(
        &status_rx.borrow(),
        &motion_rx.borrow(),
        start.elapsed().as_secs(),
    );
    final_status.save(&args.output_dir.join("live_status_final.json"))?;

    println!("\n=== Final Stats ===");
    println!("Trips written: {}", written);
    println!("Trips discarded: {}", final_status.trips_discarded);
    println!("Steps: {}", final_status.step_count);
    println!("GPS fixes: {} ({} skipped)", final_status.gps_fixes, final_status.gps_skipped);

    outcome.map(|_| ()).map_err(Into::into)
}

async fn classifier_task(
    mut rx: mpsc::Receiver<SensorMessage>,
    mut fusion: SensorFusionManager,
    class_tx: watch::Sender<MovementClassification>,
    motion_tx: watch::Sender<MotionSnapshot>,
) {
    while let Some(message) = rx.recv().await {
        let change = match message {
            SensorMessage::Accel(accel) => fusion.feed_accel(&accel),
            SensorMessage::Gyro(gyro) => fusion.feed_gyro(&gyro),
            SensorMessage::Unavailable(kind) => {
                fusion.mark_unavailable(kind);
                None
            }
        };
        if let Some(classification) = change {
            class_tx.send_replace(classification);
        }
        motion_tx.send_replace(fusion.snapshot());
    }
    fusion.stop();
}

/// Append every trip payload to `trips.jsonl`, export it, and confirm it when
/// asked to. Returns the number of trips written.
async fn trip_consumer(
    mut rx: broadcast::Receiver<TripBroadcast>,
    output_dir: PathBuf,
    user: Option<String>,
    confirm_as: Option<TransportType>,
) -> usize {
    let mut repository = JsonLinesRepository::new(output_dir.join("transport_records.jsonl"));
    let mut written = 0;

    loop {
        let message = match rx.recv().await {
            Ok(message) => message,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("[TRIP] Writer fell behind, {} trip(s) lost", missed);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match handle_trip(&message, &output_dir, user.as_deref(), confirm_as, &mut repository) {
            Ok(()) => written += 1,
            Err(err) => error!("[TRIP] Failed to store {}: {:#}", message.trip.id, err),
        }
    }
    written
}

fn handle_trip(
    message: &TripBroadcast,
    output_dir: &Path,
    user: Option<&str>,
    confirm_as: Option<TransportType>,
    repository: &mut JsonLinesRepository,
) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_dir.join("trips.jsonl"))?;
    writeln!(file, "{}", message.to_payload()?)?;

    let trip = match (user, confirm_as) {
        (Some(user), Some(transport)) => {
            let (confirmed, record) = confirm_trip(&message.trip, user, transport)?;
            repository.save(&record)?;
            info!(
                "[TRIP] {} confirmed as {} for {}",
                confirmed.id, transport, user
            );
            confirmed
        }
        _ => message.trip.clone(),
    };

    let (json, gpx) = write_trip_files(&output_dir.join("trips"), &trip)?;
    info!(
        "[TRIP] {} saved ({:.2} km) to {} and {}",
        trip.id,
        trip.distance_km,
        json.display(),
        gpx.display()
    );
    Ok(())
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
