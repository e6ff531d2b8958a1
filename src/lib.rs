//! Trip and motion detection core for EcoTracker.
//!
//! [`sensor_fusion`] classifies raw accelerometer/gyroscope streams into a
//! movement type; [`trip_detection`] segments location fixes into trips;
//! [`service`] runs trip detection as a supervised background task that
//! publishes finalized trips on an [`event_bus::TripBus`].

pub mod config;
pub mod error;
pub mod event_bus;
pub mod export;
pub mod geodesy;
pub mod health_monitor;
pub mod live_status;
pub mod restart_manager;
pub mod ring_buffer;
pub mod sensor_fusion;
pub mod sensors;
pub mod service;
pub mod transport;
pub mod trip;
pub mod trip_detection;
pub mod types;

pub use error::{TrackerError, TrackerResult};
pub use sensor_fusion::{MovementClassification, MovementType, SensorFusionManager};
pub use service::{ServiceHandle, TripDetectionService};
pub use trip::Trip;
pub use trip_detection::TripDetector;
