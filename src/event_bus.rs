//! In-process delivery of detection results.
//!
//! Finalized trips fan out over a bounded broadcast channel: every subscriber
//! sees every trip, and a subscriber that falls behind loses the oldest ones.
//! Classification changes use a single-slot watch channel, so readers always
//! see the latest value and never a backlog.

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::error::TrackerResult;
use crate::sensor_fusion::MovementClassification;
use crate::trip::Trip;

/// Action tag carried by trip broadcasts.
pub const TRIP_DETECTED_ACTION: &str = "eco_tracker.TRIP_DETECTED";

pub const DEFAULT_BUS_CAPACITY: usize = 16;

/// Immutable message published once per finalized trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripBroadcast {
    pub action: String,
    pub trip: Trip,
}

impl TripBroadcast {
    pub fn trip_detected(trip: Trip) -> Self {
        Self {
            action: TRIP_DETECTED_ACTION.to_string(),
            trip,
        }
    }

    /// Serialized form for crossing a process boundary.
    pub fn to_payload(&self) -> TrackerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_payload(payload: &str) -> TrackerResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[derive(Clone)]
pub struct TripBus {
    sender: broadcast::Sender<TripBroadcast>,
}

impl TripBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TripBroadcast> {
        self.sender.subscribe()
    }

    /// Publish a trip. Returns how many subscribers received it; zero
    /// subscribers is not an error.
    pub fn publish(&self, trip: Trip) -> usize {
        let id = trip.id.clone();
        match self.sender.send(TripBroadcast::trip_detected(trip)) {
            Ok(receivers) => {
                debug!("[BUS] {} delivered to {} subscriber(s)", id, receivers);
                receivers
            }
            Err(_) => {
                debug!("[BUS] {} published with no subscribers", id);
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TripBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// Latest-value channel for classification changes.
pub fn classification_channel() -> (
    watch::Sender<MovementClassification>,
    watch::Receiver<MovementClassification>,
) {
    watch::channel(MovementClassification::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor_fusion::MovementType;
    use crate::types::LocationSample;

    fn trip(id: &str) -> Trip {
        let a = LocationSample::new(52.52, 13.405, 1_700_000_000.0);
        let b = LocationSample::new(52.53, 13.405, 1_700_000_300.0).with_accuracy(4.0);
        Trip {
            id: id.to_string(),
            start_time: a.timestamp,
            end_time: b.timestamp,
            duration_secs: 300.0,
            distance_km: 1.11,
            average_speed_kmh: 13.3,
            route: vec![a.clone(), b.clone()],
            start_point: a,
            end_point: b,
            transport_type: None,
            user_id: None,
        }
    }

    #[test]
    fn test_payload_round_trip_keeps_trip() {
        let message = TripBroadcast::trip_detected(trip("trip_1"));
        let payload = message.to_payload().unwrap();
        assert!(payload.contains(TRIP_DETECTED_ACTION));
        assert_eq!(TripBroadcast::from_payload(&payload).unwrap(), message);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(TripBroadcast::from_payload("{\"action\":1}").is_err());
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_trip() {
        let bus = TripBus::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.publish(trip("trip_2")), 2);
        assert_eq!(first.recv().await.unwrap().trip.id, "trip_2");
        assert_eq!(second.recv().await.unwrap().trip.id, "trip_2");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = TripBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(trip("trip_3")), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_loses_oldest() {
        let bus = TripBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..3 {
            bus.publish(trip(&format!("trip_{}", i)));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap().trip.id, "trip_1");
    }

    #[test]
    fn test_classification_channel_holds_latest() {
        let (tx, rx) = classification_channel();
        assert_eq!(rx.borrow().movement_type, MovementType::Unknown);
        tx.send_replace(MovementClassification::from_type(MovementType::Walking));
        tx.send_replace(MovementClassification::from_type(MovementType::Stationary));
        let latest = *rx.borrow();
        assert_eq!(latest.movement_type, MovementType::Stationary);
        assert!(!latest.is_moving);
    }
}
