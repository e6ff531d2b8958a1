//! Configuration file for the whole tracker. Every field is optional; missing
//! ones take the component defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{TrackerError, TrackerResult};
use crate::sensor_fusion::MotionConfig;
use crate::service::ServiceConfig;
use crate::trip_detection::TripDetectionConfig;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub motion: MotionConfig,
    pub trip: TripDetectionConfig,
    pub service: ServiceConfig,
}

impl TrackerConfig {
    pub fn load(path: &Path) -> TrackerResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            TrackerError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: TrackerConfig = serde_json::from_str(&text).map_err(|e| {
            TrackerError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrackerResult<()> {
        self.motion.validate()?;
        self.trip.validate()?;
        self.service.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        fs::write(
            &path,
            r#"{"trip": {"min_trip_distance_m": 120.0}, "service": {"low_power_interval_secs": 90.0}}"#,
        )
        .unwrap();

        let config = TrackerConfig::load(&path).unwrap();
        assert_eq!(config.trip.min_trip_distance_m, 120.0);
        assert_eq!(config.trip.stationary_timeout_secs, 30.0);
        assert_eq!(config.service.low_power_interval_secs, 90.0);
        assert_eq!(config.service.low_power_fastest_secs, 15.0);
        assert_eq!(config.motion.history_capacity, 50);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        fs::write(&path, r#"{"motion": {"evaluation_window": 80}}"#).unwrap();
        assert!(matches!(
            TrackerConfig::load(&path),
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = TrackerConfig::load(Path::new("/nonexistent/tracker.json")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
