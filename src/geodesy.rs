//! Distances between fixes on the WGS84 ellipsoid.

use geo::{GeodesicDistance, Point};

use crate::types::LocationSample;

fn point(sample: &LocationSample) -> Point<f64> {
    // geo points are (x = lon, y = lat)
    Point::new(sample.longitude, sample.latitude)
}

/// Geodesic distance between two fixes in meters.
pub fn distance_m(from: &LocationSample, to: &LocationSample) -> f64 {
    point(from).geodesic_distance(&point(to))
}

/// Sum of consecutive segment distances along a route, meters.
pub fn route_length_m(route: &[LocationSample]) -> f64 {
    route
        .windows(2)
        .map(|pair| distance_m(&pair[0], &pair[1]))
        .sum()
}

/// Motion between two consecutive fixes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub distance_m: f64,
    pub elapsed_secs: f64,
    pub speed_ms: f64,
}

impl Segment {
    pub fn between(prev: &LocationSample, current: &LocationSample) -> Self {
        let distance_m = distance_m(prev, current);
        let elapsed_secs = current.timestamp - prev.timestamp;
        let speed_ms = if elapsed_secs > 0.0 {
            distance_m / elapsed_secs
        } else {
            0.0
        };
        Segment {
            distance_m,
            elapsed_secs,
            speed_ms,
        }
    }
}

/// Move `meters` north of a fix. Used to build synthetic routes.
pub fn offset_north(sample: &LocationSample, meters: f64, timestamp: f64) -> LocationSample {
    const R: f64 = 6_371_000.0;
    let d_lat = (meters / R).to_degrees();
    LocationSample::new(sample.latitude + d_lat, sample.longitude, timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_distance() {
        let a = LocationSample::new(48.8566, 2.3522, 0.0);
        assert_eq!(distance_m(&a, &a), 0.0);
    }

    #[test]
    fn test_one_degree_latitude() {
        let a = LocationSample::new(0.0, 0.0, 0.0);
        let b = LocationSample::new(1.0, 0.0, 0.0);
        // ~110.57 km at the equator on WGS84
        assert_relative_eq!(distance_m(&a, &b), 110_574.0, max_relative = 1e-3);
    }

    #[test]
    fn test_segment_speed() {
        let a = LocationSample::new(45.0, 7.0, 1000.0);
        let b = offset_north(&a, 100.0, 1010.0);
        let seg = Segment::between(&a, &b);
        assert_relative_eq!(seg.distance_m, 100.0, max_relative = 0.01);
        assert_relative_eq!(seg.speed_ms, 10.0, max_relative = 0.01);
    }

    #[test]
    fn test_segment_zero_elapsed_has_zero_speed() {
        let a = LocationSample::new(45.0, 7.0, 1000.0);
        let b = offset_north(&a, 50.0, 1000.0);
        assert_eq!(Segment::between(&a, &b).speed_ms, 0.0);

        let c = offset_north(&a, 50.0, 990.0);
        assert_eq!(Segment::between(&a, &c).speed_ms, 0.0);
    }

    #[test]
    fn test_route_length() {
        let a = LocationSample::new(45.0, 7.0, 0.0);
        let b = offset_north(&a, 30.0, 5.0);
        let c = offset_north(&b, 40.0, 10.0);
        assert_relative_eq!(route_length_m(&[a.clone(), b, c]), 70.0, max_relative = 0.01);
        assert_eq!(route_length_m(&[a]), 0.0);
        assert_eq!(route_length_m(&[]), 0.0);
    }
}
