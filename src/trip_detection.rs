// trip_detection.rs: Trip segmentation from a stream of location fixes
//
// Pure state machine: fixes in (delivery order), events out. It never touches
// the location provider or the clock; the host applies cadence changes and
// delivers finalized trips.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{TrackerError, TrackerResult};
use crate::geodesy::Segment;
use crate::trip::{Trip, TripCandidate, TripOutcome};
use crate::types::LocationSample;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TripDetectionConfig {
    /// Minimum speed between fixes that counts as movement, m/s
    pub min_speed_ms: f64,
    /// Minimum displacement between fixes that counts as movement, m
    pub min_segment_m: f64,
    /// Continuous stationary time that ends a trip, s
    pub stationary_timeout_secs: f64,
    pub min_trip_distance_m: f64,
    pub min_route_points: usize,
}

impl Default for TripDetectionConfig {
    fn default() -> Self {
        Self {
            min_speed_ms: 1.0,
            min_segment_m: 10.0,
            stationary_timeout_secs: 30.0,
            min_trip_distance_m: 50.0,
            min_route_points: 2,
        }
    }
}

impl TripDetectionConfig {
    pub fn validate(&self) -> TrackerResult<()> {
        if self.min_speed_ms < 0.0 || self.min_segment_m < 0.0 || self.min_trip_distance_m < 0.0 {
            return Err(TrackerError::InvalidConfig(
                "trip detection thresholds must not be negative".to_string(),
            ));
        }
        if self.stationary_timeout_secs <= 0.0 {
            return Err(TrackerError::InvalidConfig(
                "stationary timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Movement predicate between two consecutive fixes.
    pub fn is_movement(&self, segment: &Segment) -> bool {
        segment.speed_ms >= self.min_speed_ms && segment.distance_m >= self.min_segment_m
    }
}

// ─── States and events ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionState {
    Idle,
    Tracking,
}

/// How often the provider should deliver fixes in a given state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationCadence {
    /// Idle: infrequent fixes, balanced accuracy
    LowPower,
    /// Tracking: frequent fixes, high accuracy
    HighAccuracy,
}

impl LocationCadence {
    pub fn for_state(state: DetectionState) -> Self {
        match state {
            DetectionState::Idle => LocationCadence::LowPower,
            DetectionState::Tracking => LocationCadence::HighAccuracy,
        }
    }
}

impl fmt::Display for LocationCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationCadence::LowPower => f.write_str("low-power"),
            LocationCadence::HighAccuracy => f.write_str("high-accuracy"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DetectionEvent {
    ReferenceFix { latitude: f64, longitude: f64 },
    TrackingStarted { start_time: f64, latitude: f64, longitude: f64 },
    RouteExtended { points: usize, speed_ms: f64 },
    StationaryStarted { since: f64 },
    TripFinalized(Trip),
    TripDiscarded { points: usize, distance_m: f64 },
    CadenceChanged(LocationCadence),
}

/// Counters for status reporting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorStats {
    pub fixes_processed: u64,
    pub trips_finalized: u64,
    pub trips_discarded: u64,
}

// ─── The state machine ───────────────────────────────────────────────────────

pub struct TripDetector {
    config: TripDetectionConfig,
    state: DetectionState,
    last_fix: Option<LocationSample>,
    candidate: Option<TripCandidate>,
    stationary_since: Option<f64>,
    stats: DetectorStats,
}

impl TripDetector {
    pub fn new(config: TripDetectionConfig) -> Self {
        Self {
            config,
            state: DetectionState::Idle,
            last_fix: None,
            candidate: None,
            stationary_since: None,
            stats: DetectorStats::default(),
        }
    }

    /// Feed one fix, in delivery order.
    pub fn feed_location(&mut self, fix: LocationSample) -> Vec<DetectionEvent> {
        let mut events = Vec::new();
        self.stats.fixes_processed += 1;

        let Some(prev) = self.last_fix.replace(fix.clone()) else {
            debug!("[TRIP] Reference fix at ({:.6}, {:.6})", fix.latitude, fix.longitude);
            events.push(DetectionEvent::ReferenceFix {
                latitude: fix.latitude,
                longitude: fix.longitude,
            });
            return events;
        };

        let segment = Segment::between(&prev, &fix);
        let moving = self.config.is_movement(&segment);
        debug!(
            "[TRIP] {:?} dist={:.1}m dt={:.1}s speed={:.2}m/s moving={}",
            self.state, segment.distance_m, segment.elapsed_secs, segment.speed_ms, moving
        );

        match (self.state, moving) {
            (DetectionState::Idle, true) => {
                info!(
                    "[TRIP] Movement detected ({:.1} m/s over {:.0} m), tracking started",
                    segment.speed_ms, segment.distance_m
                );
                self.state = DetectionState::Tracking;
                self.stationary_since = None;
                events.push(DetectionEvent::TrackingStarted {
                    start_time: fix.timestamp,
                    latitude: fix.latitude,
                    longitude: fix.longitude,
                });
                self.candidate = Some(TripCandidate::start(fix));
                events.push(DetectionEvent::CadenceChanged(LocationCadence::HighAccuracy));
            }
            (DetectionState::Tracking, true) => {
                self.stationary_since = None;
                if let Some(candidate) = self.candidate.as_mut() {
                    candidate.push(fix);
                    events.push(DetectionEvent::RouteExtended {
                        points: candidate.len(),
                        speed_ms: segment.speed_ms,
                    });
                }
            }
            (DetectionState::Tracking, false) => {
                let since = match self.stationary_since {
                    Some(since) => since,
                    None => {
                        self.stationary_since = Some(fix.timestamp);
                        events.push(DetectionEvent::StationaryStarted { since: fix.timestamp });
                        fix.timestamp
                    }
                };
                if fix.timestamp - since >= self.config.stationary_timeout_secs {
                    info!(
                        "[TRIP] Stationary for {:.0}s, ending trip",
                        fix.timestamp - since
                    );
                    events.extend(self.end_trip(fix.timestamp));
                }
            }
            (DetectionState::Idle, false) => {
                self.stationary_since = None;
            }
        }

        events
    }

    /// Close the current trip at `now`. Safe to call in any state: with no
    /// trip in progress it does nothing.
    pub fn end_trip(&mut self, now: f64) -> Vec<DetectionEvent> {
        let mut events = Vec::new();
        let was_tracking = self.state == DetectionState::Tracking;
        self.state = DetectionState::Idle;
        self.stationary_since = None;

        let Some(candidate) = self.candidate.take() else {
            return events;
        };

        match candidate.finalize(now, self.config.min_route_points, self.config.min_trip_distance_m) {
            TripOutcome::Finalized(trip) => {
                self.stats.trips_finalized += 1;
                info!(
                    "[TRIP] Finalized {}: {:.2} km in {:.0}s ({:.1} km/h, {} points)",
                    trip.id,
                    trip.distance_km,
                    trip.duration_secs,
                    trip.average_speed_kmh,
                    trip.route.len()
                );
                events.push(DetectionEvent::TripFinalized(trip));
            }
            TripOutcome::Discarded { points, distance_m } => {
                self.stats.trips_discarded += 1;
                debug!(
                    "[TRIP] Discarded candidate: {} points, {:.1} m",
                    points, distance_m
                );
                events.push(DetectionEvent::TripDiscarded { points, distance_m });
            }
        }

        if was_tracking {
            events.push(DetectionEvent::CadenceChanged(LocationCadence::LowPower));
        }
        events
    }

    /// Flush any trip in progress, as on service teardown. `now` falls back to
    /// the last fix time.
    pub fn stop(&mut self, now: Option<f64>) -> Vec<DetectionEvent> {
        let now = now
            .or_else(|| self.last_fix.as_ref().map(|f| f.timestamp))
            .unwrap_or(0.0);
        self.end_trip(now)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn cadence(&self) -> LocationCadence {
        LocationCadence::for_state(self.state)
    }

    pub fn is_tracking(&self) -> bool {
        self.state == DetectionState::Tracking
    }

    pub fn route_len(&self) -> usize {
        self.candidate.as_ref().map(TripCandidate::len).unwrap_or(0)
    }

    pub fn route_distance_m(&self) -> f64 {
        self.candidate
            .as_ref()
            .map(TripCandidate::distance_m)
            .unwrap_or(0.0)
    }

    pub fn stationary_since(&self) -> Option<f64> {
        self.stationary_since
    }

    pub fn last_fix(&self) -> Option<&LocationSample> {
        self.last_fix.as_ref()
    }

    pub fn stats(&self) -> &DetectorStats {
        &self.stats
    }

    pub fn config(&self) -> &TripDetectionConfig {
        &self.config
    }
}
