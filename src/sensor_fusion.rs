// sensor_fusion.rs: Motion classification from raw IMU streams
//
// Pure computation: no runtime, no I/O. Accelerometer and gyroscope samples go
// in (in arrival order, timestamps in seconds), a debounced movement
// classification comes out. The host decides how samples are delivered and
// where change notifications go.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{TrackerError, TrackerResult};
use crate::ring_buffer::RingBuffer;
use crate::types::{AccelData, GyroData, SensorKind};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    // ── Windows ──
    pub magnitude_window: usize,
    pub history_capacity: usize,
    pub evaluation_window: usize,
    pub min_samples: usize,

    // ── Step detection ──
    pub step_threshold: f64,
    pub step_debounce_secs: f64,
    pub step_timeout_secs: f64,

    // ── Evaluation gate ──
    pub evaluation_interval_secs: f64,

    // ── Stationary ──
    pub stationary_accel_variance: f64,
    pub stationary_gyro_variance: f64,
    pub stationary_step_rate: f64,

    // ── Walking ──
    pub walking_min_step_rate: f64,
    pub walking_max_step_rate: f64,
    pub walking_accel_variance: f64,
    pub walking_gyro_variance: f64,

    // ── Running ──
    pub running_step_rate: f64,
    pub running_accel_variance: f64,

    // ── Vehicle ──
    pub vehicle_accel_variance: f64,
    pub vehicle_gyro_variance: f64,
    pub vehicle_mean_accel: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            magnitude_window: 20,
            history_capacity: 50,
            evaluation_window: 20,
            min_samples: 10,
            step_threshold: 9.5,
            step_debounce_secs: 0.2,
            step_timeout_secs: 5.0,
            evaluation_interval_secs: 1.0,
            stationary_accel_variance: 0.5,
            stationary_gyro_variance: 0.1,
            stationary_step_rate: 0.5,
            walking_min_step_rate: 0.5,
            walking_max_step_rate: 3.0,
            walking_accel_variance: 2.0,
            walking_gyro_variance: 0.5,
            running_step_rate: 3.0,
            running_accel_variance: 5.0,
            vehicle_accel_variance: 1.5,
            vehicle_gyro_variance: 0.2,
            vehicle_mean_accel: 2.0,
        }
    }
}

impl MotionConfig {
    pub fn validate(&self) -> TrackerResult<()> {
        if self.magnitude_window == 0 || self.history_capacity == 0 || self.evaluation_window == 0 {
            return Err(TrackerError::InvalidConfig(
                "motion windows must be non-empty".to_string(),
            ));
        }
        if self.evaluation_window > self.history_capacity {
            return Err(TrackerError::InvalidConfig(format!(
                "evaluation window {} exceeds history capacity {}",
                self.evaluation_window, self.history_capacity
            )));
        }
        if self.min_samples > self.history_capacity {
            return Err(TrackerError::InvalidConfig(format!(
                "min samples {} exceeds history capacity {}",
                self.min_samples, self.history_capacity
            )));
        }
        if self.step_debounce_secs <= 0.0 || self.evaluation_interval_secs <= 0.0 {
            return Err(TrackerError::InvalidConfig(
                "step debounce and evaluation interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Classification ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Stationary,
    Walking,
    Running,
    Vehicle,
    Unknown,
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MovementType::Stationary => "STATIONARY",
            MovementType::Walking => "WALKING",
            MovementType::Running => "RUNNING",
            MovementType::Vehicle => "VEHICLE",
            MovementType::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementClassification {
    pub movement_type: MovementType,
    pub is_moving: bool,
}

impl MovementClassification {
    pub fn from_type(movement_type: MovementType) -> Self {
        Self {
            movement_type,
            is_moving: movement_type != MovementType::Stationary,
        }
    }
}

impl Default for MovementClassification {
    fn default() -> Self {
        Self {
            movement_type: MovementType::Unknown,
            is_moving: false,
        }
    }
}

/// Window statistics one evaluation works from.
///
/// The "variance" fields hold the standard deviation of the magnitude series,
/// which is what every threshold in [`MotionConfig`] is tuned against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionStats {
    pub mean_accel: f64,
    pub accel_variance: f64,
    pub gyro_variance: f64,
    pub step_rate: f64,
}

/// Priority-ordered decision table; first match wins.
pub fn classify(stats: &MotionStats, config: &MotionConfig) -> MovementType {
    let MotionStats {
        mean_accel,
        accel_variance,
        gyro_variance,
        step_rate,
    } = *stats;

    if accel_variance < config.stationary_accel_variance
        && gyro_variance < config.stationary_gyro_variance
        && step_rate < config.stationary_step_rate
    {
        MovementType::Stationary
    } else if step_rate > config.walking_min_step_rate
        && step_rate < config.walking_max_step_rate
        && accel_variance > config.walking_accel_variance
        && gyro_variance > config.walking_gyro_variance
    {
        MovementType::Walking
    } else if step_rate >= config.running_step_rate && accel_variance > config.running_accel_variance {
        MovementType::Running
    } else if accel_variance < config.vehicle_accel_variance
        && gyro_variance < config.vehicle_gyro_variance
        && mean_accel < config.vehicle_mean_accel
    {
        MovementType::Vehicle
    } else {
        MovementType::Unknown
    }
}

/// Mean and standard deviation of a magnitude series.
fn magnitude_stats(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

// ─── Step detection ──────────────────────────────────────────────────────────

/// Threshold-crossing step counter over gravity-removed acceleration magnitude.
#[derive(Clone, Debug)]
pub struct StepDetector {
    magnitudes: RingBuffer<f64>,
    threshold: f64,
    debounce_secs: f64,
    timeout_secs: f64,
    above_threshold: bool,
    last_step_ts: Option<f64>,
    step_count: u64,
}

impl StepDetector {
    pub fn new(config: &MotionConfig) -> Self {
        Self {
            magnitudes: RingBuffer::new(config.magnitude_window),
            threshold: config.step_threshold,
            debounce_secs: config.step_debounce_secs,
            timeout_secs: config.step_timeout_secs,
            above_threshold: false,
            last_step_ts: None,
            step_count: 0,
        }
    }

    /// Feed one raw magnitude. Returns true when a step was registered.
    pub fn process(&mut self, magnitude: f64, timestamp: f64) -> bool {
        self.magnitudes.push(magnitude);
        let filtered = magnitude - self.magnitudes.mean();

        let above = filtered > self.threshold;
        let rising_edge = above && !self.above_threshold;
        self.above_threshold = above;
        if !rising_edge {
            return false;
        }

        if let Some(last) = self.last_step_ts {
            // Also rejects out-of-order timestamps, keeping step times non-decreasing
            if timestamp - last < self.debounce_secs {
                return false;
            }
        }

        self.last_step_ts = Some(timestamp);
        self.step_count += 1;
        debug!(
            "[STEP] #{} at t={:.3}s (filtered {:.2} m/s²)",
            self.step_count, timestamp, filtered
        );
        true
    }

    /// Steps per second implied by the time since the last step.
    pub fn step_rate(&self, now: f64) -> f64 {
        let Some(last) = self.last_step_ts else {
            return 0.0;
        };
        let elapsed = now - last;
        if elapsed > self.timeout_secs {
            0.0
        } else if elapsed < self.debounce_secs {
            1.0 / self.debounce_secs
        } else {
            1.0 / elapsed
        }
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn last_step_ts(&self) -> Option<f64> {
        self.last_step_ts
    }

    /// Clear the count and the filter state.
    pub fn reset(&mut self) {
        self.magnitudes.clear();
        self.above_threshold = false;
        self.last_step_ts = None;
        self.step_count = 0;
    }
}

// ─── The manager ─────────────────────────────────────────────────────────────

/// Point-in-time view of the classifier for status reporting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MotionSnapshot {
    pub classification: MovementClassification,
    pub stats: MotionStats,
    pub step_count: u64,
    pub accel_samples: usize,
    pub gyro_samples: usize,
    pub accel_available: bool,
    pub gyro_available: bool,
    pub evaluations: u64,
}

pub struct SensorFusionManager {
    config: MotionConfig,
    steps: StepDetector,

    accel_history: RingBuffer<AccelData>,
    gyro_history: RingBuffer<GyroData>,
    accel_available: bool,
    gyro_available: bool,

    last_evaluation_ts: Option<f64>,
    stats: MotionStats,
    current: MovementClassification,
    evaluations: u64,
}

impl SensorFusionManager {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            steps: StepDetector::new(&config),
            accel_history: RingBuffer::new(config.history_capacity),
            gyro_history: RingBuffer::new(config.history_capacity),
            accel_available: true,
            gyro_available: true,
            last_evaluation_ts: None,
            stats: MotionStats::default(),
            current: MovementClassification::default(),
            evaluations: 0,
            config,
        }
    }

    /// Record that a sensor is missing on this device. The stream then never
    /// contributes samples and evaluation stops waiting for it.
    pub fn mark_unavailable(&mut self, sensor: SensorKind) {
        match sensor {
            SensorKind::Accelerometer => {
                if self.accel_available {
                    warn!("[MOTION] Accelerometer not available, classification disabled");
                }
                self.accel_available = false;
            }
            SensorKind::Gyroscope => {
                if self.gyro_available {
                    warn!("[MOTION] Gyroscope not available, gyro variance held at {:.2}", self.stats.gyro_variance);
                }
                self.gyro_available = false;
            }
            SensorKind::Location => {}
        }
    }

    // ── Sensor feeds ─────────────────────────────────────────────────────

    /// Feed accelerometer sample. Returns the new classification when it changed.
    pub fn feed_accel(&mut self, accel: &AccelData) -> Option<MovementClassification> {
        if !self.accel_available {
            return None;
        }
        self.steps.process(accel.magnitude(), accel.timestamp);
        self.accel_history.push(accel.clone());
        self.maybe_evaluate(accel.timestamp)
    }

    /// Feed gyroscope sample. Returns the new classification when it changed.
    pub fn feed_gyro(&mut self, gyro: &GyroData) -> Option<MovementClassification> {
        if !self.gyro_available {
            return None;
        }
        self.gyro_history.push(gyro.clone());
        self.maybe_evaluate(gyro.timestamp)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn classification(&self) -> MovementClassification {
        self.current
    }

    pub fn step_count(&self) -> u64 {
        self.steps.step_count()
    }

    /// Cadence as of the last evaluation, steps per second.
    pub fn cadence(&self) -> f64 {
        self.stats.step_rate
    }

    pub fn stats(&self) -> MotionStats {
        self.stats
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> MotionSnapshot {
        MotionSnapshot {
            classification: self.current,
            stats: self.stats,
            step_count: self.steps.step_count(),
            accel_samples: self.accel_history.len(),
            gyro_samples: self.gyro_history.len(),
            accel_available: self.accel_available,
            gyro_available: self.gyro_available,
            evaluations: self.evaluations,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    pub fn reset_steps(&mut self) {
        self.steps.reset();
    }

    /// Drop all rolling state, as on unsubscribe. Step count survives.
    pub fn stop(&mut self) {
        self.accel_history.clear();
        self.gyro_history.clear();
        self.last_evaluation_ts = None;
        self.stats = MotionStats::default();
        self.current = MovementClassification::default();
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn has_enough_samples(&self) -> bool {
        let min = self.config.min_samples;
        let accel_ok = self.accel_history.len() >= min;
        let gyro_ok = !self.gyro_available || self.gyro_history.len() >= min;
        accel_ok && gyro_ok
    }

    fn maybe_evaluate(&mut self, now: f64) -> Option<MovementClassification> {
        if let Some(last) = self.last_evaluation_ts {
            if now - last < self.config.evaluation_interval_secs {
                return None;
            }
        }
        if !self.has_enough_samples() {
            return None;
        }
        self.last_evaluation_ts = Some(now);
        self.evaluations += 1;

        let window = self.config.evaluation_window;
        let (mean_accel, accel_variance) =
            magnitude_stats(self.accel_history.last_n(window).map(AccelData::magnitude));
        // Without a gyroscope the previous (initial) value stands
        let gyro_variance = if self.gyro_history.is_empty() {
            self.stats.gyro_variance
        } else {
            magnitude_stats(self.gyro_history.last_n(window).map(GyroData::magnitude)).1
        };

        self.stats = MotionStats {
            mean_accel,
            accel_variance,
            gyro_variance,
            step_rate: self.steps.step_rate(now),
        };

        let next = MovementClassification::from_type(classify(&self.stats, &self.config));
        debug!(
            "[MOTION] t={:.2}s accel_var={:.3} gyro_var={:.3} mean={:.2} rate={:.2} -> {}",
            now, accel_variance, gyro_variance, mean_accel, self.stats.step_rate, next.movement_type
        );

        if next == self.current {
            return None;
        }
        info!(
            "[MOTION] {} -> {} (moving: {})",
            self.current.movement_type, next.movement_type, next.is_moving
        );
        self.current = next;
        Some(next)
    }
}
