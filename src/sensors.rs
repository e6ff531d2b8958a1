use flate2::read::GzDecoder;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::error::{TrackerError, TrackerResult};
use crate::geodesy::offset_north;
use crate::service::{LocationPriority, LocationProvider, LocationRequest};
use crate::types::{AccelData, GyroData, LocationSample, LocationUpdate, SensorKind};

/// One message from a motion source to the classifier task.
#[derive(Clone, Debug, PartialEq)]
pub enum SensorMessage {
    Accel(AccelData),
    Gyro(GyroData),
    /// The sensor cannot produce data; sent once, then the source stops
    Unavailable(SensorKind),
}

pub const MOTION_SAMPLE_PERIOD: Duration = Duration::from_millis(20);

// ─── Termux:API ──────────────────────────────────────────────────────────────

pub async fn accel_loop(tx: Sender<SensorMessage>) {
    motion_loop(tx, SensorKind::Accelerometer, "accelerometer").await
}

pub async fn gyro_loop(tx: Sender<SensorMessage>, enabled: bool) {
    if !enabled {
        let _ = tx.send(SensorMessage::Unavailable(SensorKind::Gyroscope)).await;
        return;
    }
    motion_loop(tx, SensorKind::Gyroscope, "gyroscope").await
}

async fn motion_loop(tx: Sender<SensorMessage>, kind: SensorKind, sensor: &'static str) {
    let mut ticker = interval(MOTION_SAMPLE_PERIOD); // ~50Hz
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sample_count = 0u64;

    loop {
        ticker.tick().await;

        let values = match tokio::task::spawn_blocking(move || read_termux_sensor(sensor)).await {
            Ok(Ok(values)) => values,
            Ok(Err(err)) => {
                warn!("[{}] {}, continuing without it", kind, err);
                let _ = tx.send(SensorMessage::Unavailable(kind)).await;
                return;
            }
            Err(join_err) => {
                warn!("[{}] reader task failed: {}", kind, join_err);
                continue;
            }
        };
        let Some([x, y, z]) = values else {
            continue;
        };

        let timestamp = current_timestamp();
        let message = match kind {
            SensorKind::Gyroscope => SensorMessage::Gyro(GyroData::new(timestamp, x, y, z)),
            _ => SensorMessage::Accel(AccelData::new(timestamp, x, y, z)),
        };

        match tx.try_send(message) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 500 == 0 {
                    debug!("[{}] {} samples", kind, sample_count);
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!("[{}] Channel closed after {} samples", kind, sample_count);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // Classifier behind, drop this sample
            }
        }
    }
}

/// One reading from `termux-sensor`. `Err` when the tool is missing,
/// `Ok(None)` when it ran but produced nothing usable.
fn read_termux_sensor(sensor: &str) -> TrackerResult<Option<[f64; 3]>> {
    let output = Command::new("termux-sensor")
        .args(["-n", "1", "-s", sensor])
        .output()
        .map_err(|e| TrackerError::SensorUnavailable(format!("termux-sensor: {}", e)))?;
    Ok(parse_sensor_output(&String::from_utf8_lossy(&output.stdout)))
}

/// termux-sensor prints `{"<sensor name>": {"values": [x, y, z]}}`.
pub fn parse_sensor_output(output: &str) -> Option<[f64; 3]> {
    let json: Value = serde_json::from_str(output.trim()).ok()?;
    json.as_object()?.values().find_map(|entry| {
        let values = entry.get("values")?.as_array()?;
        match values.as_slice() {
            [x, y, z, ..] => Some([x.as_f64()?, y.as_f64()?, z.as_f64()?]),
            _ => None,
        }
    })
}

#[derive(Deserialize)]
struct TermuxLocation {
    latitude: f64,
    longitude: f64,
    accuracy: Option<f64>,
    speed: Option<f64>,
}

/// termux-location prints one JSON object per fix; anything else is an
/// update without a location.
pub fn parse_location_output(output: &str, timestamp: f64) -> LocationUpdate {
    let raw: TermuxLocation = serde_json::from_str(output.trim()).ok()?;
    let mut fix = LocationSample::new(raw.latitude, raw.longitude, timestamp);
    fix.accuracy = raw.accuracy;
    fix.speed = raw.speed;
    Some(fix)
}

fn read_termux_location(priority: LocationPriority) -> TrackerResult<LocationUpdate> {
    let provider = match priority {
        LocationPriority::HighAccuracy => "gps",
        LocationPriority::BalancedPowerAccuracy => "network",
    };
    let output = Command::new("termux-location")
        .args(["-p", provider, "-r", "once"])
        .output()
        .map_err(|e| TrackerError::LocationProvider(format!("termux-location: {}", e)))?;
    Ok(parse_location_output(
        &String::from_utf8_lossy(&output.stdout),
        current_timestamp(),
    ))
}

/// Location provider backed by `termux-location`, polled at the request
/// interval.
#[derive(Default)]
pub struct TermuxLocationProvider {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TermuxLocationProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocationProvider for TermuxLocationProvider {
    fn request_updates(
        &self,
        request: &LocationRequest,
        sink: Sender<LocationUpdate>,
    ) -> TrackerResult<()> {
        let period = request.interval;
        let priority = request.priority;
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let update =
                    match tokio::task::spawn_blocking(move || read_termux_location(priority)).await {
                        Ok(Ok(update)) => update,
                        Ok(Err(err)) => {
                            warn!("[gps] {}", err);
                            return;
                        }
                        Err(_) => None,
                    };
                if sink.send(update).await.is_err() {
                    return;
                }
            }
        });
        replace_task(&self.task, Some(task));
        Ok(())
    }

    fn remove_updates(&self) {
        replace_task(&self.task, None);
    }
}

fn replace_task(slot: &Mutex<Option<JoinHandle<()>>>, task: Option<JoinHandle<()>>) {
    if let Ok(mut current) = slot.lock() {
        if let Some(old) = std::mem::replace(&mut *current, task) {
            old.abort();
        }
    }
}

// ─── Simulated commute ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommutePhase {
    Still,
    Walking,
    Riding,
}

/// Scripted day out: stand, walk to the stop, ride, stand at the destination.
#[derive(Clone, Debug)]
pub struct CommuteScript {
    legs: Vec<(CommutePhase, f64, f64)>, // phase, seconds, m/s
}

impl Default for CommuteScript {
    fn default() -> Self {
        Self {
            legs: vec![
                (CommutePhase::Still, 60.0, 0.0),
                (CommutePhase::Walking, 240.0, 1.4),
                (CommutePhase::Riding, 600.0, 8.0),
                (CommutePhase::Still, 300.0, 0.0),
            ],
        }
    }
}

impl CommuteScript {
    pub fn new(legs: Vec<(CommutePhase, f64, f64)>) -> Self {
        Self { legs }
    }

    pub fn total_secs(&self) -> f64 {
        self.legs.iter().map(|(_, secs, _)| secs).sum()
    }

    /// Phase at `t` seconds into the script; still once it is over.
    pub fn phase_at(&self, t: f64) -> CommutePhase {
        let mut start = 0.0;
        for (phase, secs, _) in &self.legs {
            if t < start + secs {
                return *phase;
            }
            start += secs;
        }
        CommutePhase::Still
    }

    /// Distance covered by `t`, meters.
    pub fn distance_at(&self, t: f64) -> f64 {
        let mut start = 0.0;
        let mut distance = 0.0;
        for (_, secs, speed) in &self.legs {
            let within = (t - start).clamp(0.0, *secs);
            distance += within * speed;
            start += secs;
        }
        distance
    }

    pub fn accel_at(&self, t: f64, timestamp: f64) -> AccelData {
        use std::f64::consts::PI;
        const G: f64 = 9.81;
        match self.phase_at(t) {
            CommutePhase::Still => AccelData::new(timestamp, 0.01 * (t * 7.0).sin(), 0.0, G),
            CommutePhase::Walking => {
                // Heel strike every 0.55 s
                let spike = if t % 0.55 < 0.04 { 12.0 } else { 0.0 };
                AccelData::new(timestamp, 0.8 * (2.0 * PI * 1.8 * t).sin(), 0.0, G + spike)
            }
            CommutePhase::Riding => {
                AccelData::new(timestamp, 0.0, 0.1 * (2.0 * PI * t).cos(), G + 0.3 * (6.0 * PI * t).sin())
            }
        }
    }

    pub fn gyro_at(&self, t: f64, timestamp: f64) -> GyroData {
        use std::f64::consts::PI;
        match self.phase_at(t) {
            CommutePhase::Still => GyroData::new(timestamp, 0.0, 0.0, 0.0),
            CommutePhase::Walking => GyroData::new(timestamp, 2.5 * (2.0 * PI * 1.8 * t).sin(), 0.0, 0.0),
            CommutePhase::Riding => GyroData::new(timestamp, 0.0, 0.0, 0.03 * (0.5 * t).sin()),
        }
    }
}

/// Simulated clock shared by the simulated sources: seconds into the script,
/// advanced `time_scale` times faster than wall time.
#[derive(Clone, Debug)]
pub struct SimulatedClock {
    start_epoch: f64,
    time_scale: f64,
    started: tokio::time::Instant,
}

impl SimulatedClock {
    pub fn new(start_epoch: f64, time_scale: f64) -> Self {
        Self {
            start_epoch,
            time_scale: time_scale.max(f64::EPSILON),
            started: tokio::time::Instant::now(),
        }
    }

    pub fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * self.time_scale
    }

    pub fn epoch(&self, t: f64) -> f64 {
        self.start_epoch + t
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    fn real_period(&self, simulated: Duration) -> Duration {
        Duration::from_secs_f64(simulated.as_secs_f64() / self.time_scale).max(Duration::from_millis(1))
    }
}

/// Accelerometer and optionally gyroscope samples following the script.
pub async fn simulated_motion_loop(
    tx: Sender<SensorMessage>,
    script: CommuteScript,
    clock: SimulatedClock,
    enable_gyro: bool,
) {
    if !enable_gyro {
        let _ = tx.send(SensorMessage::Unavailable(SensorKind::Gyroscope)).await;
    }
    let mut ticker = interval(clock.real_period(MOTION_SAMPLE_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut t = 0.0;

    loop {
        ticker.tick().await;
        t += MOTION_SAMPLE_PERIOD.as_secs_f64();
        let timestamp = clock.epoch(t);

        let mut messages = vec![SensorMessage::Accel(script.accel_at(t, timestamp))];
        if enable_gyro {
            messages.push(SensorMessage::Gyro(script.gyro_at(t, timestamp)));
        }
        for message in messages {
            if let Err(TrySendError::Closed(_)) = tx.try_send(message) {
                return;
            }
        }
    }
}

/// Location provider replaying the scripted commute northwards from `origin`.
/// Every `dropout_every`-th update carries no location.
pub struct SimulatedLocationProvider {
    script: CommuteScript,
    origin: LocationSample,
    clock: SimulatedClock,
    dropout_every: u64,
    emitted: Arc<Mutex<u64>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedLocationProvider {
    pub fn new(script: CommuteScript, origin: LocationSample, clock: SimulatedClock) -> Self {
        Self {
            script,
            origin,
            clock,
            dropout_every: 0,
            emitted: Arc::new(Mutex::new(0)),
            task: Mutex::new(None),
        }
    }

    pub fn with_dropouts(mut self, every: u64) -> Self {
        self.dropout_every = every;
        self
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.lock().map(|n| *n).unwrap_or(0)
    }
}

impl LocationProvider for SimulatedLocationProvider {
    fn request_updates(
        &self,
        request: &LocationRequest,
        sink: Sender<LocationUpdate>,
    ) -> TrackerResult<()> {
        let script = self.script.clone();
        let origin = self.origin.clone();
        let clock = self.clock.clone();
        let dropout_every = self.dropout_every;
        let emitted = Arc::clone(&self.emitted);
        let period = clock.real_period(request.interval);
        info!(
            "[sim] Location every {:.1}s simulated ({:.3}s real)",
            request.interval.as_secs_f64(),
            period.as_secs_f64()
        );

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let t = clock.elapsed();
                let count = match emitted.lock() {
                    Ok(mut n) => {
                        *n += 1;
                        *n
                    }
                    Err(_) => return,
                };
                let update = if dropout_every > 0 && count % dropout_every == 0 {
                    None
                } else {
                    Some(
                        offset_north(&origin, script.distance_at(t), clock.epoch(t))
                            .with_accuracy(5.0),
                    )
                };
                if sink.send(update).await.is_err() {
                    return;
                }
            }
        });
        replace_task(&self.task, Some(task));
        Ok(())
    }

    fn remove_updates(&self) {
        replace_task(&self.task, None);
    }
}

// ─── Recorded sessions ───────────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
pub struct GpsReading {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
}

impl From<&GpsReading> for LocationSample {
    fn from(gps: &GpsReading) -> Self {
        LocationSample {
            latitude: gps.latitude,
            longitude: gps.longitude,
            timestamp: gps.timestamp,
            accuracy: gps.accuracy,
            speed: gps.speed,
        }
    }
}

/// One row of a recorded session; unknown sensor fields are ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct Reading {
    pub timestamp: f64,
    #[serde(default)]
    pub accel: Option<AccelData>,
    #[serde(default)]
    pub gyro: Option<GyroData>,
    #[serde(default)]
    pub gps: Option<GpsReading>,
}

impl Reading {
    /// The recorded fix, when there is one with usable coordinates.
    pub fn fix(&self) -> Option<LocationSample> {
        self.gps
            .as_ref()
            .map(LocationSample::from)
            .filter(LocationSample::is_valid)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionLog {
    pub readings: Vec<Reading>,
}

impl SessionLog {
    /// Load a `.json` or `.json.gz` session.
    pub fn load(path: &Path) -> TrackerResult<Self> {
        let file = File::open(path)?;
        if path.extension().map(|e| e == "gz").unwrap_or(false) {
            let reader = BufReader::new(GzDecoder::new(file));
            Ok(serde_json::from_reader(reader)?)
        } else {
            let reader = BufReader::new(file);
            Ok(serde_json::from_reader(reader)?)
        }
    }

    pub fn fixes(&self) -> impl Iterator<Item = LocationSample> + '_ {
        self.readings
            .iter()
            .filter_map(Reading::fix)
    }

    pub fn has_gyro(&self) -> bool {
        self.readings.iter().any(|r| r.gyro.is_some())
    }
}

pub fn current_timestamp() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
