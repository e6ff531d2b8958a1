use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::geodesy;
use crate::transport::TransportType;
use crate::types::LocationSample;

/// A finalized trip waiting for the user to confirm how it was travelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    /// Seconds since the Unix epoch
    pub start_time: f64,
    pub end_time: f64,
    pub duration_secs: f64,
    pub distance_km: f64,
    pub average_speed_kmh: f64,
    pub route: Vec<LocationSample>,
    pub start_point: LocationSample,
    pub end_point: LocationSample,
    /// Unset until confirmed downstream
    pub transport_type: Option<TransportType>,
    pub user_id: Option<String>,
}

impl Trip {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_utc(self.start_time)
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_utc(self.end_time)
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_km * 1000.0
    }
}

pub(crate) fn epoch_to_utc(secs: f64) -> Option<DateTime<Utc>> {
    let millis = (secs * 1000.0).round() as i64;
    Utc.timestamp_millis_opt(millis).single()
}

/// What happened to a candidate when tracking ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TripOutcome {
    Finalized(Trip),
    Discarded { points: usize, distance_m: f64 },
}

/// Route being accumulated while tracking.
#[derive(Debug, Clone)]
pub struct TripCandidate {
    start_time: f64,
    route: Vec<LocationSample>,
}

impl TripCandidate {
    /// Start a candidate whose route is just `first`.
    pub fn start(first: LocationSample) -> Self {
        Self {
            start_time: first.timestamp,
            route: vec![first],
        }
    }

    pub fn push(&mut self, fix: LocationSample) {
        self.route.push(fix);
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn len(&self) -> usize {
        self.route.len()
    }

    pub fn is_empty(&self) -> bool {
        self.route.is_empty()
    }

    pub fn distance_m(&self) -> f64 {
        geodesy::route_length_m(&self.route)
    }

    /// Freeze the candidate at `now`, or discard it when the route is too
    /// short to be a trip.
    pub fn finalize(self, now: f64, min_points: usize, min_distance_m: f64) -> TripOutcome {
        let distance_m = self.distance_m();
        let points = self.route.len();
        if points < min_points.max(2) || distance_m < min_distance_m {
            return TripOutcome::Discarded { points, distance_m };
        }

        let (start_point, end_point) = match (self.route.first(), self.route.last()) {
            (Some(first), Some(last)) => (first.clone(), last.clone()),
            _ => return TripOutcome::Discarded { points, distance_m },
        };

        let duration_secs = (now - self.start_time).max(0.0);
        let average_speed_kmh = if duration_secs > 0.0 {
            distance_m / duration_secs * 3.6
        } else {
            0.0
        };

        TripOutcome::Finalized(Trip {
            id: format!("trip_{}", (self.start_time * 1000.0).round() as i64),
            start_time: self.start_time,
            end_time: now,
            duration_secs,
            distance_km: distance_m / 1000.0,
            average_speed_kmh,
            route: self.route,
            start_point,
            end_point,
            transport_type: None,
            user_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::offset_north;
    use approx::assert_relative_eq;

    fn straight_candidate(step_m: f64, steps: usize) -> TripCandidate {
        let origin = LocationSample::new(51.5, -0.12, 1_700_000_000.0);
        let mut candidate = TripCandidate::start(origin.clone());
        let mut last = origin;
        for i in 1..=steps {
            let next = offset_north(&last, step_m, last.timestamp + 5.0);
            candidate.push(next.clone());
            last = next;
            assert_eq!(candidate.len(), i + 1);
        }
        candidate
    }

    #[test]
    fn test_finalize_builds_trip() {
        let candidate = straight_candidate(25.0, 8);
        let start = candidate.start_time();
        let outcome = candidate.finalize(start + 100.0, 2, 50.0);
        let TripOutcome::Finalized(trip) = outcome else {
            panic!("expected a finalized trip");
        };
        assert_relative_eq!(trip.distance_km, 0.2, max_relative = 0.01);
        assert_eq!(trip.duration_secs, 100.0);
        // 200 m in 100 s = 2 m/s = 7.2 km/h
        assert_relative_eq!(trip.average_speed_kmh, 7.2, max_relative = 0.01);
        assert_eq!(trip.route.len(), 9);
        assert_eq!(trip.start_point, trip.route[0]);
        assert_eq!(trip.end_point, trip.route[8]);
        assert!(trip.transport_type.is_none());
        assert!(trip.user_id.is_none());
        assert_eq!(trip.id, "trip_1700000000000");
    }

    #[test]
    fn test_short_trip_discarded() {
        let candidate = straight_candidate(20.0, 2);
        let start = candidate.start_time();
        match candidate.finalize(start + 60.0, 2, 50.0) {
            TripOutcome::Discarded { points, distance_m } => {
                assert_eq!(points, 3);
                assert_relative_eq!(distance_m, 40.0, max_relative = 0.01);
            }
            other => panic!("expected discard, got {:?}", other),
        }
    }

    #[test]
    fn test_single_point_discarded() {
        let candidate = TripCandidate::start(LocationSample::new(0.0, 0.0, 10.0));
        assert!(matches!(
            candidate.finalize(20.0, 2, 0.0),
            TripOutcome::Discarded { points: 1, .. }
        ));
    }

    #[test]
    fn test_zero_duration_has_zero_speed() {
        let candidate = straight_candidate(30.0, 3);
        let start = candidate.start_time();
        let TripOutcome::Finalized(trip) = candidate.finalize(start, 2, 50.0) else {
            panic!("expected a finalized trip");
        };
        assert_eq!(trip.average_speed_kmh, 0.0);
    }

    #[test]
    fn test_timestamps_convert() {
        let candidate = straight_candidate(30.0, 3);
        let start = candidate.start_time();
        let TripOutcome::Finalized(trip) = candidate.finalize(start + 60.0, 2, 50.0) else {
            panic!("expected a finalized trip");
        };
        let started = trip.started_at().unwrap();
        assert_eq!(started.timestamp(), 1_700_000_000);
        assert_eq!((trip.ended_at().unwrap() - started).num_seconds(), 60);
    }
}
