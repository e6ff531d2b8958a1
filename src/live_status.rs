use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::TrackerResult;
use crate::sensor_fusion::{MotionSnapshot, MovementType};
use crate::service::{ServiceState, ServiceStatus};

/// Snapshot written periodically for external dashboards.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    // Trip detection
    pub service_state: ServiceState,
    pub route_points: usize,
    pub route_distance_m: f64,
    pub trips_emitted: u64,
    pub trips_discarded: u64,
    // Location health
    pub gps_fixes: u64,
    pub gps_skipped: u64,
    pub gps_healthy: bool,
    pub gps_silence_duration_secs: f64,
    pub gps_resubscriptions: u32,
    // Motion
    pub movement_type: MovementType,
    pub is_moving: bool,
    pub step_count: u64,
    pub step_rate: f64,
    pub accel_available: bool,
    pub gyro_available: bool,
}

impl LiveStatus {
    pub fn new(service: &ServiceStatus, motion: &MotionSnapshot, uptime_seconds: u64) -> Self {
        Self {
            timestamp: current_timestamp(),
            uptime_seconds,
            service_state: service.state,
            route_points: service.route_points,
            route_distance_m: service.route_distance_m,
            trips_emitted: service.trips_emitted,
            trips_discarded: service.trips_discarded,
            gps_fixes: service.health.fixes,
            gps_skipped: service.health.skipped,
            gps_healthy: service.health.healthy,
            gps_silence_duration_secs: service.health.silence_secs,
            gps_resubscriptions: service.health.resubscriptions,
            movement_type: motion.classification.movement_type,
            is_moving: motion.classification.is_moving,
            step_count: motion.step_count,
            step_rate: motion.stats.step_rate,
            accel_available: motion.accel_available,
            gyro_available: motion.gyro_available,
        }
    }

    pub fn save(&self, path: &Path) -> TrackerResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor_fusion::{MotionConfig, SensorFusionManager};

    #[test]
    fn test_save_status() {
        let motion = SensorFusionManager::new(MotionConfig::default()).snapshot();
        let status = LiveStatus::new(&ServiceStatus::default(), &motion, 12);
        assert_eq!(status.service_state, ServiceState::Idle);
        assert!(status.gps_healthy);
        assert_eq!(status.movement_type, MovementType::Unknown);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live_status.json");
        status.save(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"service_state\": \"IDLE\""));
        assert!(text.contains("\"uptime_seconds\": 12"));
    }
}
