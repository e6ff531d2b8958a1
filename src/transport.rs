//! Confirmed transport records and the persistence contract they go through.
//!
//! Detection never writes here on its own: a record only exists once the user
//! has said how a detected trip was travelled.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{TrackerError, TrackerResult};
use crate::trip::{epoch_to_utc, Trip};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportType {
    Car,
    Bus,
    Bicycle,
    Walking,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportType::Car => "car",
            TransportType::Bus => "bus",
            TransportType::Bicycle => "bicycle",
            TransportType::Walking => "walking",
        };
        f.write_str(name)
    }
}

impl FromStr for TransportType {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "car" => Ok(TransportType::Car),
            "bus" => Ok(TransportType::Bus),
            "bicycle" | "bike" => Ok(TransportType::Bicycle),
            "walking" | "walk" => Ok(TransportType::Walking),
            other => Err(TrackerError::InvalidConfig(format!(
                "unknown transport type '{}'",
                other
            ))),
        }
    }
}

/// One user-confirmed transport event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportRecord {
    pub user_id: String,
    pub transport_type: TransportType,
    pub trip_id: String,
    pub distance_km: f64,
    pub duration_secs: f64,
    pub date: NaiveDate,
    pub recorded_at: DateTime<Utc>,
}

/// Bind a detected trip to a user and a transport type.
pub fn confirm_trip(
    trip: &Trip,
    user_id: &str,
    transport_type: TransportType,
) -> TrackerResult<(Trip, TransportRecord)> {
    let started = epoch_to_utc(trip.start_time).ok_or_else(|| {
        TrackerError::InvalidConfig(format!("trip {} has an invalid start time", trip.id))
    })?;

    let mut confirmed = trip.clone();
    confirmed.transport_type = Some(transport_type);
    confirmed.user_id = Some(user_id.to_string());

    let record = TransportRecord {
        user_id: user_id.to_string(),
        transport_type,
        trip_id: trip.id.clone(),
        distance_km: trip.distance_km,
        duration_secs: trip.duration_secs,
        date: started.date_naive(),
        recorded_at: Utc::now(),
    };
    Ok((confirmed, record))
}

/// Transport persistence contract.
pub trait TransportRepository {
    fn save(&mut self, record: &TransportRecord) -> TrackerResult<()>;

    /// Most recent record of `user_id` dated `today`.
    fn query_today(&self, user_id: &str, today: NaiveDate) -> TrackerResult<Option<TransportRecord>>;
}

/// Append-only JSON-lines store, one record per line.
pub struct JsonLinesRepository {
    path: PathBuf,
}

impl JsonLinesRepository {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn load_all(&self) -> TrackerResult<Vec<TransportRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(TrackerError::from))
            .collect()
    }
}

impl TransportRepository for JsonLinesRepository {
    fn save(&mut self, record: &TransportRecord) -> TrackerResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn query_today(&self, user_id: &str, today: NaiveDate) -> TrackerResult<Option<TransportRecord>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|r| r.user_id == user_id && r.date == today)
            .max_by_key(|r| r.recorded_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LocationSample;

    fn sample_trip() -> Trip {
        let a = LocationSample::new(40.0, -3.7, 1_700_000_000.0);
        let b = LocationSample::new(40.01, -3.7, 1_700_000_600.0);
        Trip {
            id: "trip_1700000000000".to_string(),
            start_time: a.timestamp,
            end_time: b.timestamp,
            duration_secs: 600.0,
            distance_km: 1.1,
            average_speed_kmh: 6.6,
            route: vec![a.clone(), b.clone()],
            start_point: a,
            end_point: b,
            transport_type: None,
            user_id: None,
        }
    }

    #[test]
    fn test_parse_transport_type() {
        assert_eq!("Bike".parse::<TransportType>().unwrap(), TransportType::Bicycle);
        assert_eq!("bus".parse::<TransportType>().unwrap(), TransportType::Bus);
        assert!("rocket".parse::<TransportType>().is_err());
    }

    #[test]
    fn test_confirm_binds_user() {
        let trip = sample_trip();
        let (confirmed, record) = confirm_trip(&trip, "user-42", TransportType::Walking).unwrap();
        assert_eq!(confirmed.user_id.as_deref(), Some("user-42"));
        assert_eq!(confirmed.transport_type, Some(TransportType::Walking));
        assert_eq!(record.trip_id, trip.id);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
        // The detected trip itself stays unconfirmed
        assert!(trip.user_id.is_none());
    }

    #[test]
    fn test_json_lines_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = JsonLinesRepository::new(dir.path().join("records.jsonl"));
        let day = NaiveDate::from_ymd_opt(2023, 11, 14).unwrap();
        assert!(repo.query_today("user-42", day).unwrap().is_none());

        let (_, record) = confirm_trip(&sample_trip(), "user-42", TransportType::Bus).unwrap();
        repo.save(&record).unwrap();
        let (_, other) = confirm_trip(&sample_trip(), "someone-else", TransportType::Car).unwrap();
        repo.save(&other).unwrap();

        let found = repo.query_today("user-42", day).unwrap().unwrap();
        assert_eq!(found.transport_type, TransportType::Bus);
        assert!(repo
            .query_today("user-42", day.succ_opt().unwrap())
            .unwrap()
            .is_none());
    }
}
