use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TrackerResult;
use crate::trip::{epoch_to_utc, Trip};

/// Finalized trip plus summary fields, JSON-serializable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripExport {
    pub trip: Trip,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub route_points: usize,
}

impl TripExport {
    pub fn new(trip: &Trip) -> Self {
        TripExport {
            trip: trip.clone(),
            started_at: trip.started_at().map(|t| t.to_rfc3339()),
            ended_at: trip.ended_at().map(|t| t.to_rfc3339()),
            route_points: trip.route.len(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// GPX track format for mapping applications
#[derive(Debug, Serialize)]
pub struct GpxTrack {
    pub name: String,
    pub description: String,
    pub track_points: Vec<GpxPoint>,
}

#[derive(Debug, Serialize)]
pub struct GpxPoint {
    pub lat: f64,
    pub lon: f64,
    pub time: Option<String>,
    /// Approximate, from horizontal accuracy
    pub hdop: Option<f64>,
}

impl GpxTrack {
    pub fn from_trip(trip: &Trip) -> Self {
        let track_points = trip
            .route
            .iter()
            .map(|fix| GpxPoint {
                lat: fix.latitude,
                lon: fix.longitude,
                time: epoch_to_utc(fix.timestamp).map(|t| t.to_rfc3339()),
                hdop: fix.accuracy.map(|a| a / 2.0),
            })
            .collect();

        let mut description = format!(
            "{:.2} km in {:.0} s, {:.1} km/h",
            trip.distance_km, trip.duration_secs, trip.average_speed_kmh
        );
        if let Some(transport) = trip.transport_type {
            description.push_str(&format!(" by {}", transport));
        }

        GpxTrack {
            name: trip.id.clone(),
            description,
            track_points,
        }
    }

    /// Generate GPX 1.1 document XML string
    pub fn to_gpx_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(
            "<gpx version=\"1.1\" creator=\"eco_tracker\" xmlns=\"http://www.topografix.com/GPX/1/1\">\n",
        );
        xml.push_str("  <metadata>\n");
        xml.push_str(&format!("    <name>{}</name>\n", escape_xml(&self.name)));
        xml.push_str(&format!("    <desc>{}</desc>\n", escape_xml(&self.description)));
        xml.push_str("  </metadata>\n");
        xml.push_str("  <trk>\n");
        xml.push_str(&format!("    <name>{}</name>\n", escape_xml(&self.name)));
        xml.push_str("    <trkseg>\n");

        for point in &self.track_points {
            xml.push_str(&format!(
                "      <trkpt lat=\"{:.7}\" lon=\"{:.7}\">\n",
                point.lat, point.lon
            ));
            if let Some(time) = &point.time {
                xml.push_str(&format!("        <time>{}</time>\n", time));
            }
            if let Some(hdop) = point.hdop {
                xml.push_str(&format!("        <hdop>{:.1}</hdop>\n", hdop));
            }
            xml.push_str("      </trkpt>\n");
        }

        xml.push_str("    </trkseg>\n");
        xml.push_str("  </trk>\n");
        xml.push_str("</gpx>\n");

        xml
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Write `<id>.json` and `<id>.gpx` under `dir`; returns both paths.
pub fn write_trip_files(dir: &Path, trip: &Trip) -> TrackerResult<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let json_path = dir.join(format!("{}.json", trip.id));
    let gpx_path = dir.join(format!("{}.gpx", trip.id));
    fs::write(&json_path, TripExport::new(trip).to_json()?)?;
    fs::write(&gpx_path, GpxTrack::from_trip(trip).to_gpx_xml())?;
    Ok((json_path, gpx_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportType;
    use crate::types::LocationSample;

    fn trip() -> Trip {
        let a = LocationSample::new(40.4168, -3.7038, 1_700_000_000.0).with_accuracy(8.0);
        let b = LocationSample::new(40.4268, -3.7038, 1_700_000_420.0);
        Trip {
            id: "trip_1700000000000".to_string(),
            start_time: a.timestamp,
            end_time: b.timestamp,
            duration_secs: 420.0,
            distance_km: 1.11,
            average_speed_kmh: 9.5,
            route: vec![a.clone(), b.clone()],
            start_point: a,
            end_point: b,
            transport_type: Some(TransportType::Bicycle),
            user_id: Some("u1".to_string()),
        }
    }

    #[test]
    fn test_export_json() {
        let export = TripExport::new(&trip());
        assert_eq!(export.route_points, 2);
        assert_eq!(
            export.started_at.as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
        let json = export.to_json().unwrap();
        assert!(json.contains("\"distance_km\": 1.11"));
        assert!(json.contains("BICYCLE"));
    }

    #[test]
    fn test_gpx_generation() {
        let xml = GpxTrack::from_trip(&trip()).to_gpx_xml();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<trkpt lat=\"40.4168000\" lon=\"-3.7038000\">"));
        assert!(xml.contains("<hdop>4.0</hdop>"));
        assert!(xml.contains("by bicycle"));
        assert_eq!(xml.matches("<trkpt").count(), 2);
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape_xml("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_write_trip_files() {
        let dir = tempfile::tempdir().unwrap();
        let (json, gpx) = write_trip_files(&dir.path().join("trips"), &trip()).unwrap();
        assert!(json.exists());
        assert!(fs::read_to_string(gpx).unwrap().contains("<gpx"));
    }
}
