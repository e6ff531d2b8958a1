use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Accelerometer sample, m/s², timestamp in seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelData {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelData {
    pub fn new(timestamp: f64, x: f64, y: f64, z: f64) -> Self {
        Self { timestamp, x, y, z }
    }

    pub fn vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn magnitude(&self) -> f64 {
        self.vector().norm()
    }
}

/// Gyroscope sample, rad/s, timestamp in seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GyroData {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl GyroData {
    pub fn new(timestamp: f64, x: f64, y: f64, z: f64) -> Self {
        Self { timestamp, x, y, z }
    }

    pub fn vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn magnitude(&self) -> f64 {
        self.vector().norm()
    }
}

/// A single GPS fix. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Device fix time, seconds since the Unix epoch
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64, timestamp: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            accuracy: None,
            speed: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Finite coordinates inside the WGS84 range and a finite timestamp.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.timestamp.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A location result as delivered by a provider; `None` when the result
/// carried no usable fix.
pub type LocationUpdate = Option<LocationSample>;

/// Hardware streams the detectors consume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    Location,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::Location => "location",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accel_magnitude() {
        let accel = AccelData::new(0.0, 3.0, 4.0, 0.0);
        assert_eq!(accel.magnitude(), 5.0);
    }

    #[test]
    fn test_gyro_magnitude() {
        let gyro = GyroData::new(0.0, 0.6, 0.8, 0.0);
        assert!((gyro.magnitude() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_location_optional_fields_omitted() {
        let fix = LocationSample::new(52.5, 13.4, 100.0);
        let json = serde_json::to_string(&fix).unwrap();
        assert!(!json.contains("accuracy"));

        let parsed: LocationSample =
            serde_json::from_str(r#"{"latitude":1.0,"longitude":2.0,"timestamp":3.0,"speed":4.5}"#)
                .unwrap();
        assert_eq!(parsed.speed, Some(4.5));
        assert_eq!(parsed.accuracy, None);
    }

    #[test]
    fn test_location_validity() {
        assert!(LocationSample::new(-33.86, 151.2, 10.0).is_valid());
        assert!(!LocationSample::new(91.0, 0.0, 10.0).is_valid());
        assert!(!LocationSample::new(0.0, f64::NAN, 10.0).is_valid());
    }
}
