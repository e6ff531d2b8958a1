// service.rs: Long-lived trip detection runtime
//
// Wraps the pure TripDetector in one tokio task that owns the location
// subscription, the wake lock and the fix-silence health check. Fixes are
// processed strictly in delivery order; stopping flushes any trip in progress
// through the same finalize path as the stationary timeout.

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, Instant, MissedTickBehavior};

use crate::error::{TrackerError, TrackerResult};
use crate::event_bus::{TripBus, DEFAULT_BUS_CAPACITY};
use crate::health_monitor::{HealthReport, LocationHealth};
use crate::restart_manager::{RestartPolicy, RestartState};
use crate::trip::Trip;
use crate::trip_detection::{
    DetectionEvent, DetectionState, LocationCadence, TripDetectionConfig, TripDetector,
};
use crate::types::LocationUpdate;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Wake lock cap for one run
    pub wake_lock_timeout_secs: f64,
    pub low_power_interval_secs: f64,
    pub low_power_fastest_secs: f64,
    pub high_accuracy_interval_secs: f64,
    pub high_accuracy_fastest_secs: f64,
    /// No update for this long triggers a resubscription
    pub fix_silence_secs: f64,
    pub health_check_interval_secs: f64,
    pub update_queue_capacity: usize,
    pub bus_capacity: usize,
    pub restart_base_secs: f64,
    pub restart_max_secs: f64,
    pub max_restarts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            wake_lock_timeout_secs: 10.0 * 3600.0,
            low_power_interval_secs: 60.0,
            low_power_fastest_secs: 15.0,
            high_accuracy_interval_secs: 10.0,
            high_accuracy_fastest_secs: 2.0,
            fix_silence_secs: 180.0,
            health_check_interval_secs: 5.0,
            update_queue_capacity: 64,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            restart_base_secs: 2.0,
            restart_max_secs: 30.0,
            max_restarts: 60,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> TrackerResult<()> {
        let durations = [
            ("wake_lock_timeout_secs", self.wake_lock_timeout_secs),
            ("low_power_interval_secs", self.low_power_interval_secs),
            ("low_power_fastest_secs", self.low_power_fastest_secs),
            ("high_accuracy_interval_secs", self.high_accuracy_interval_secs),
            ("high_accuracy_fastest_secs", self.high_accuracy_fastest_secs),
            ("fix_silence_secs", self.fix_silence_secs),
            ("health_check_interval_secs", self.health_check_interval_secs),
            ("restart_base_secs", self.restart_base_secs),
            ("restart_max_secs", self.restart_max_secs),
        ];
        for (name, value) in durations {
            if !(value.is_finite() && value > 0.0) {
                return Err(TrackerError::InvalidConfig(format!(
                    "{} must be a positive number of seconds",
                    name
                )));
            }
        }
        if self.low_power_fastest_secs > self.low_power_interval_secs
            || self.high_accuracy_fastest_secs > self.high_accuracy_interval_secs
        {
            return Err(TrackerError::InvalidConfig(
                "fastest interval must not exceed the update interval".to_string(),
            ));
        }
        if self.update_queue_capacity == 0 || self.bus_capacity == 0 {
            return Err(TrackerError::InvalidConfig(
                "channel capacities must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_for(&self, cadence: LocationCadence) -> LocationRequest {
        let (interval, fastest, priority) = match cadence {
            LocationCadence::LowPower => (
                self.low_power_interval_secs,
                self.low_power_fastest_secs,
                LocationPriority::BalancedPowerAccuracy,
            ),
            LocationCadence::HighAccuracy => (
                self.high_accuracy_interval_secs,
                self.high_accuracy_fastest_secs,
                LocationPriority::HighAccuracy,
            ),
        };
        LocationRequest {
            cadence,
            interval: Duration::from_secs_f64(interval),
            fastest_interval: Duration::from_secs_f64(fastest),
            priority,
        }
    }
}

// ─── Host collaborators ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPriority {
    HighAccuracy,
    BalancedPowerAccuracy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocationRequest {
    pub cadence: LocationCadence,
    pub interval: Duration,
    pub fastest_interval: Duration,
    pub priority: LocationPriority,
}

/// Source of location updates.
///
/// `request_updates` replaces any previous subscription; updates flow into
/// `sink` until `remove_updates` is called.
pub trait LocationProvider: Send + Sync {
    fn request_updates(
        &self,
        request: &LocationRequest,
        sink: mpsc::Sender<LocationUpdate>,
    ) -> TrackerResult<()>;

    fn remove_updates(&self);
}

pub trait PermissionChecker: Send + Sync {
    fn has_location_permission(&self) -> bool;
}

pub trait WakeLock: Send + Sync {
    fn acquire(&self, timeout: Duration) -> TrackerResult<()>;
    fn release(&self);
    fn is_held(&self) -> bool;
}

pub trait SessionProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}

/// Fixed answer, for hosts without a permission model.
#[derive(Clone, Copy, Debug)]
pub struct StaticPermission(pub bool);

impl PermissionChecker for StaticPermission {
    fn has_location_permission(&self) -> bool {
        self.0
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticSession(pub Option<String>);

impl SessionProvider for StaticSession {
    fn current_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}

/// In-process wake lock that lapses on its own after the timeout.
#[derive(Debug, Default)]
pub struct TimedWakeLock {
    held_until: Mutex<Option<Instant>>,
    acquisitions: AtomicU32,
}

impl TimedWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquisitions(&self) -> u32 {
        self.acquisitions.load(Ordering::Relaxed)
    }
}

impl WakeLock for TimedWakeLock {
    fn acquire(&self, timeout: Duration) -> TrackerResult<()> {
        let mut held = self
            .held_until
            .lock()
            .map_err(|_| TrackerError::Internal("wake lock state poisoned".to_string()))?;
        *held = Some(Instant::now() + timeout);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        debug!("[WAKE] Acquired for {:.0}s", timeout.as_secs_f64());
        Ok(())
    }

    fn release(&self) {
        if let Ok(mut held) = self.held_until.lock() {
            if held.take().is_some() {
                debug!("[WAKE] Released");
            }
        }
    }

    fn is_held(&self) -> bool {
        self.held_until
            .lock()
            .ok()
            .and_then(|held| *held)
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }
}

/// Auto-start on boot only when a signed-in session survives.
pub fn should_start_on_boot(session: &dyn SessionProvider) -> bool {
    match session.current_user_id() {
        Some(user) => {
            info!("[BOOT] Session for {} found, starting trip detection", user);
            true
        }
        None => {
            info!("[BOOT] No session, trip detection stays off");
            false
        }
    }
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    Idle,
    Tracking,
    Stopped,
}

impl From<DetectionState> for ServiceState {
    fn from(state: DetectionState) -> Self {
        match state {
            DetectionState::Idle => ServiceState::Idle,
            DetectionState::Tracking => ServiceState::Tracking,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub cadence: LocationCadence,
    pub route_points: usize,
    pub route_distance_m: f64,
    pub trips_emitted: u64,
    pub trips_discarded: u64,
    pub health: HealthReport,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            state: ServiceState::Idle,
            cadence: LocationCadence::LowPower,
            route_points: 0,
            route_distance_m: 0.0,
            trips_emitted: 0,
            trips_discarded: 0,
            health: HealthReport {
                healthy: true,
                ..HealthReport::default()
            },
        }
    }
}

/// What one run produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceSummary {
    pub fixes_processed: u64,
    pub fixes_skipped: u64,
    pub trips: Vec<Trip>,
    pub trips_discarded: u64,
    pub resubscriptions: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceCommand {
    Stop,
}

// ─── Service ─────────────────────────────────────────────────────────────────

pub struct TripDetectionService {
    config: ServiceConfig,
    detection: TripDetectionConfig,
    provider: Arc<dyn LocationProvider>,
    permissions: Arc<dyn PermissionChecker>,
    wake_lock: Arc<dyn WakeLock>,
    bus: TripBus,
    status: Arc<watch::Sender<ServiceStatus>>,
    running: Arc<AtomicBool>,
}

impl TripDetectionService {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        permissions: Arc<dyn PermissionChecker>,
        wake_lock: Arc<dyn WakeLock>,
    ) -> Self {
        let config = ServiceConfig::default();
        let bus = TripBus::new(config.bus_capacity);
        Self {
            config,
            detection: TripDetectionConfig::default(),
            provider,
            permissions,
            wake_lock,
            bus,
            status: Arc::new(watch::channel(ServiceStatus::default()).0),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the config; the bus is rebuilt with the new capacity, so
    /// subscribe after configuring.
    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.bus = TripBus::new(config.bus_capacity);
        self.config = config;
        self
    }

    pub fn with_detection(mut self, detection: TripDetectionConfig) -> Self {
        self.detection = detection;
        self
    }

    pub fn with_bus(mut self, bus: TripBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn bus(&self) -> &TripBus {
        &self.bus
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Status of the current or most recent run. Survives restarts.
    pub fn subscribe_status(&self) -> watch::Receiver<ServiceStatus> {
        self.status.subscribe()
    }

    /// Start one run. Must be called inside a tokio runtime.
    /// Whether a run started here has not finished yet.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start one run. Only one run may be live at a time; a second call
    /// before it ends fails with [`TrackerError::AlreadyRunning`].
    pub fn start(&self) -> TrackerResult<ServiceHandle> {
        let run = RunGuard::claim(&self.running)?;
        if !self.permissions.has_location_permission() {
            warn!("[SERVICE] Location permission missing, not starting");
            return Err(TrackerError::PermissionDenied);
        }
        self.config.validate()?;
        self.detection.validate()?;

        self.wake_lock
            .acquire(Duration::from_secs_f64(self.config.wake_lock_timeout_secs))?;

        let (fix_tx, fix_rx) = mpsc::channel(self.config.update_queue_capacity);
        let (control_tx, control_rx) = mpsc::channel(4);
        self.status.send_replace(ServiceStatus::default());

        let worker = Worker {
            config: self.config.clone(),
            detector: TripDetector::new(self.detection.clone()),
            provider: Arc::clone(&self.provider),
            wake_lock: Arc::clone(&self.wake_lock),
            bus: self.bus.clone(),
            fix_tx,
            health: LocationHealth::new(
                Duration::from_secs_f64(self.config.fix_silence_secs),
                Instant::now(),
            ),
            status_tx: Arc::clone(&self.status),
            summary: ServiceSummary::default(),
            _run: run,
        };
        if let Err(err) = worker.subscribe(LocationCadence::LowPower) {
            self.wake_lock.release();
            return Err(err);
        }
        info!("[SERVICE] Trip detection started");

        let task = tokio::spawn(worker.run(fix_rx, control_rx));
        Ok(ServiceHandle {
            control: control_tx,
            status: self.status.subscribe(),
            provider: Arc::clone(&self.provider),
            wake_lock: Arc::clone(&self.wake_lock),
            task,
        })
    }
}

/// Marks a run as live for as long as it is held. Dropped with the worker,
/// including when the worker unwinds.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn claim(running: &Arc<AtomicBool>) -> TrackerResult<Self> {
        running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| {
                warn!("[SERVICE] Start requested while a run is live");
                TrackerError::AlreadyRunning
            })?;
        Ok(RunGuard(Arc::clone(running)))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Run a provider call, turning a panic into an error.
fn guarded<T>(what: &str, call: impl FnOnce() -> T) -> TrackerResult<T> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .map_err(|_| TrackerError::Internal(format!("location provider panicked in {}", what)))
}

pub struct ServiceHandle {
    control: mpsc::Sender<ServiceCommand>,
    status: watch::Receiver<ServiceStatus>,
    provider: Arc<dyn LocationProvider>,
    wake_lock: Arc<dyn WakeLock>,
    task: JoinHandle<TrackerResult<ServiceSummary>>,
}

impl ServiceHandle {
    pub fn state(&self) -> ServiceState {
        self.status.borrow().state
    }

    pub fn status(&self) -> ServiceStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ServiceStatus> {
        self.status.clone()
    }

    /// A sender that can stop the run from elsewhere.
    pub fn stopper(&self) -> mpsc::Sender<ServiceCommand> {
        self.control.clone()
    }

    /// Stop the run, flushing any trip in progress.
    pub async fn stop(self) -> TrackerResult<ServiceSummary> {
        if self.control.send(ServiceCommand::Stop).await.is_err() {
            debug!("[SERVICE] Stop requested after the run ended");
        }
        self.finished().await
    }

    /// Wait for the run to end without asking it to.
    pub async fn finished(self) -> TrackerResult<ServiceSummary> {
        match self.task.await {
            Ok(result) => result,
            Err(join_err) => {
                // Teardown never ran; release what the run held
                error!("[SERVICE] Detection task died: {}", join_err);
                if let Err(err) = guarded("remove_updates", || self.provider.remove_updates()) {
                    warn!("[SERVICE] {}", err);
                }
                self.wake_lock.release();
                Err(TrackerError::Internal(join_err.to_string()))
            }
        }
    }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

struct Worker {
    config: ServiceConfig,
    detector: TripDetector,
    provider: Arc<dyn LocationProvider>,
    wake_lock: Arc<dyn WakeLock>,
    bus: TripBus,
    fix_tx: mpsc::Sender<LocationUpdate>,
    health: LocationHealth,
    status_tx: Arc<watch::Sender<ServiceStatus>>,
    summary: ServiceSummary,
    _run: RunGuard,
}

impl Worker {
    async fn run(
        mut self,
        mut fix_rx: mpsc::Receiver<LocationUpdate>,
        mut control_rx: mpsc::Receiver<ServiceCommand>,
    ) -> TrackerResult<ServiceSummary> {
        let mut health_tick = interval(Duration::from_secs_f64(
            self.config.health_check_interval_secs,
        ));
        health_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let failure = loop {
            let step = tokio::select! {
                command = control_rx.recv() => {
                    match command {
                        Some(ServiceCommand::Stop) => info!("[SERVICE] Stop requested"),
                        None => info!("[SERVICE] Handle dropped, stopping"),
                    }
                    break None;
                }
                // The worker owns a sender, so this channel never closes
                Some(update) = fix_rx.recv() => self.handle_update(update),
                _ = health_tick.tick() => self.check_health(),
            };
            if let Err(err) = step {
                break Some(err);
            }
        };

        if failure.is_none() {
            // Fixes already delivered are processed before the flush
            while let Ok(update) = fix_rx.try_recv() {
                if let Err(err) = self.handle_update(update) {
                    warn!("[SERVICE] {} while draining fixes", err);
                    break;
                }
            }
        }

        let summary = self.teardown();
        match failure {
            Some(err) => {
                error!("[SERVICE] Run failed: {}", err);
                Err(err)
            }
            None => Ok(summary),
        }
    }

    fn handle_update(&mut self, update: LocationUpdate) -> TrackerResult<()> {
        let now = Instant::now();
        let fix = match update {
            Some(fix) if fix.is_valid() => fix,
            Some(fix) => {
                debug!(
                    "[SERVICE] Malformed fix ({}, {}) skipped",
                    fix.latitude, fix.longitude
                );
                self.health.record_skipped(now);
                self.summary.fixes_skipped += 1;
                return Ok(());
            }
            None => {
                debug!("[SERVICE] Update without a location skipped");
                self.health.record_skipped(now);
                self.summary.fixes_skipped += 1;
                return Ok(());
            }
        };

        self.health.record_fix(now);
        self.summary.fixes_processed += 1;
        let events = self.detector.feed_location(fix);
        let result = self.apply(events, true);
        self.publish_status();
        result
    }

    /// Deliver detector events. Every trip is published even when a
    /// resubscription fails on the way; the first failure is returned.
    fn apply(&mut self, events: Vec<DetectionEvent>, resubscribe: bool) -> TrackerResult<()> {
        let mut failure = None;
        for event in events {
            match event {
                DetectionEvent::TripFinalized(trip) => {
                    self.bus.publish(trip.clone());
                    self.summary.trips.push(trip);
                }
                DetectionEvent::TripDiscarded { .. } => {
                    self.summary.trips_discarded += 1;
                }
                DetectionEvent::CadenceChanged(cadence) if resubscribe && failure.is_none() => {
                    if let Err(err) = self.subscribe(cadence) {
                        failure = Some(err);
                    }
                }
                _ => {}
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Replace the subscription. A provider error is logged and left to the
    /// health check; a provider panic fails the run.
    fn subscribe(&self, cadence: LocationCadence) -> TrackerResult<()> {
        let request = self.config.request_for(cadence);
        let requested = guarded("request_updates", || {
            self.provider.remove_updates();
            self.provider.request_updates(&request, self.fix_tx.clone())
        })?;
        match requested {
            Ok(()) => info!(
                "[SERVICE] Location updates at {} cadence (every {:.0}s)",
                cadence,
                request.interval.as_secs_f64()
            ),
            // Not retried here; the health check resubscribes on silence
            Err(err) => warn!("[SERVICE] Location request failed: {}", err),
        }
        Ok(())
    }

    fn check_health(&mut self) -> TrackerResult<()> {
        let now = Instant::now();
        debug!("[HEALTH] {}", self.health.format_status(now));
        if !self.health.is_silent(now) {
            return Ok(());
        }
        self.health.record_resubscribe(now);
        self.summary.resubscriptions += 1;
        let result = self.subscribe(self.detector.cadence());
        self.publish_status();
        result
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(ServiceStatus {
            state: self.detector.state().into(),
            cadence: self.detector.cadence(),
            route_points: self.detector.route_len(),
            route_distance_m: self.detector.route_distance_m(),
            trips_emitted: self.summary.trips.len() as u64,
            trips_discarded: self.summary.trips_discarded,
            health: self.health.report(Instant::now()),
        });
    }

    fn teardown(mut self) -> ServiceSummary {
        let events = self.detector.stop(None);
        // No resubscription here, so nothing can fail
        let _ = self.apply(events, false);
        if let Err(err) = guarded("remove_updates", || self.provider.remove_updates()) {
            warn!("[SERVICE] {}", err);
        }
        self.wake_lock.release();

        let mut status = self.status_tx.borrow().clone();
        status.state = ServiceState::Stopped;
        status.route_points = 0;
        status.route_distance_m = 0.0;
        status.trips_emitted = self.summary.trips.len() as u64;
        status.trips_discarded = self.summary.trips_discarded;
        self.status_tx.send_replace(status);

        info!(
            "[SERVICE] Stopped: {} fixes ({} skipped), {} trip(s), {} discarded",
            self.summary.fixes_processed,
            self.summary.fixes_skipped,
            self.summary.trips.len(),
            self.summary.trips_discarded
        );
        self.summary
    }
}

// ─── Supervision ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct SupervisorReport {
    pub runs: u32,
    pub restarts: u32,
    pub summaries: Vec<ServiceSummary>,
    pub last_error: Option<TrackerError>,
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Nobody can ask for shutdown any more
            std::future::pending::<()>().await;
        }
    }
}

/// Keep the service running until `shutdown` turns true.
///
/// A run that dies abnormally is restarted under [`RestartPolicy::Sticky`]
/// after an exponential backoff. Permission denial and invalid configuration
/// end supervision with the error.
pub async fn supervise(
    service: &TripDetectionService,
    policy: RestartPolicy,
    shutdown: watch::Receiver<bool>,
) -> TrackerResult<SupervisorReport> {
    let config = service.config();
    let mut restart = RestartState::new(
        "trip-detection",
        config.max_restarts,
        Duration::from_secs_f64(config.restart_base_secs),
        Duration::from_secs_f64(config.restart_max_secs),
    );
    let mut report = SupervisorReport::default();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let failure = match service.start() {
            Ok(handle) => {
                report.runs += 1;
                let stopper = handle.stopper();
                let mut run_shutdown = shutdown.clone();
                let forwarder = tokio::spawn(async move {
                    wait_for_shutdown(&mut run_shutdown).await;
                    let _ = stopper.send(ServiceCommand::Stop).await;
                });
                let outcome = handle.finished().await;
                forwarder.abort();

                match outcome {
                    Ok(summary) => {
                        report.summaries.push(summary);
                        restart.record_success();
                        break;
                    }
                    Err(err) => err,
                }
            }
            Err(err) => err,
        };

        report.last_error = Some(failure.clone());
        if policy == RestartPolicy::NotSticky || !failure.is_restartable() {
            error!("[SERVICE] Run ended with {}, not restarting", failure);
            return Err(failure);
        }
        if !restart.can_restart() {
            error!("[RESTART] {}", restart.status());
            return Err(failure);
        }

        let delay = restart.record_failed_attempt();
        report.restarts += 1;
        let mut wait_shutdown = shutdown.clone();
        let stopped = tokio::select! {
            _ = sleep(delay) => false,
            _ = wait_for_shutdown(&mut wait_shutdown) => true,
        };
        if stopped {
            break;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_requests() {
        let config = ServiceConfig::default();
        let low = config.request_for(LocationCadence::LowPower);
        assert_eq!(low.interval, Duration::from_secs(60));
        assert_eq!(low.fastest_interval, Duration::from_secs(15));
        assert_eq!(low.priority, LocationPriority::BalancedPowerAccuracy);

        let high = config.request_for(LocationCadence::HighAccuracy);
        assert_eq!(high.interval, Duration::from_secs(10));
        assert_eq!(high.fastest_interval, Duration::from_secs(2));
        assert_eq!(high.priority, LocationPriority::HighAccuracy);
    }

    #[test]
    fn test_config_validation() {
        assert!(ServiceConfig::default().validate().is_ok());

        let inverted = ServiceConfig {
            high_accuracy_fastest_secs: 20.0,
            ..ServiceConfig::default()
        };
        assert!(inverted.validate().is_err());

        let zero = ServiceConfig {
            health_check_interval_secs: 0.0,
            ..ServiceConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_boot_requires_session() {
        assert!(should_start_on_boot(&StaticSession(Some("user-7".into()))));
        assert!(!should_start_on_boot(&StaticSession(None)));
    }

    #[test]
    fn test_wake_lock_lifecycle() {
        let lock = TimedWakeLock::new();
        assert!(!lock.is_held());
        lock.acquire(Duration::from_secs(60)).unwrap();
        assert!(lock.is_held());
        lock.release();
        assert!(!lock.is_held());
        assert_eq!(lock.acquisitions(), 1);
    }

    #[test]
    fn test_wake_lock_lapses() {
        let lock = TimedWakeLock::new();
        lock.acquire(Duration::ZERO).unwrap();
        assert!(!lock.is_held());
    }

    #[test]
    fn test_service_state_mirrors_detector() {
        assert_eq!(ServiceState::from(DetectionState::Idle), ServiceState::Idle);
        assert_eq!(
            ServiceState::from(DetectionState::Tracking),
            ServiceState::Tracking
        );
    }
}
