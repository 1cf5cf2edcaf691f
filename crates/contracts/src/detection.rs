//! DetectionRecord - Record Source output
//!
//! One traffic-sign observation, stamped with identity at ingestion time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Vehicle GPS fix attached to a detection (if the source has one)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub vehicle_lat: Option<f64>,
    pub vehicle_lon: Option<f64>,
    pub heading: Option<f64>,
    pub recording_timestamp: Option<String>,
}

/// Validated detection payload, as produced by a Record Source before identity is assigned
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionPayload {
    /// Frame index within the source video
    pub frame_number: u64,

    /// Seconds since session start (monotonic within a session)
    pub timestamp_sec: f64,

    /// Pixel-space centroid
    pub pixel_u: f64,
    pub pixel_v: f64,

    /// Model confidence in [0, 1]
    pub confidence: f64,

    /// Detector class label (e.g. "stop sign")
    pub class_name: String,

    /// Source video name, if known
    pub video_name: Option<String>,

    /// Optional GPS fields
    pub gps: GpsFix,
}

/// Single detection event delivered to the broker
///
/// Immutable once constructed; `detection_id` is generated here, never taken
/// from the source data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    // ===== Identity =====
    pub detection_id: String,
    pub vehicle_id: String,
    pub session_id: String,
    pub ingested_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_name: Option<String>,

    // ===== Frame-level data =====
    pub frame_number: u64,
    pub timestamp_sec: f64,

    // ===== Pixel space =====
    pub pixel_u: f64,
    pub pixel_v: f64,

    // ===== Detection metadata =====
    pub confidence: f64,
    pub class_name: String,

    // ===== GPS (optional) =====
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_timestamp: Option<String>,

    // ===== Computed downstream, always None at ingestion =====
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi_image_path: Option<String>,
}

impl DetectionRecord {
    /// Stamp a validated payload with a fresh id and ingestion time
    pub fn ingest(
        payload: DetectionPayload,
        vehicle_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self::with_id(generate_detection_id(), payload, vehicle_id, session_id)
    }

    /// Build a record with a caller-chosen id (replays, tests)
    pub fn with_id(
        detection_id: impl Into<String>,
        payload: DetectionPayload,
        vehicle_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        let DetectionPayload {
            frame_number,
            timestamp_sec,
            pixel_u,
            pixel_v,
            confidence,
            class_name,
            video_name,
            gps,
        } = payload;

        Self {
            detection_id: detection_id.into(),
            vehicle_id: vehicle_id.into(),
            session_id: session_id.into(),
            ingested_at: Utc::now(),
            video_name,
            frame_number,
            timestamp_sec,
            pixel_u,
            pixel_v,
            confidence,
            class_name,
            vehicle_lat: gps.vehicle_lat,
            vehicle_lon: gps.vehicle_lon,
            heading: gps.heading,
            recording_timestamp: gps.recording_timestamp,
            object_lat: None,
            object_lon: None,
            distance: None,
            roi_image_path: None,
        }
    }

    /// Whether the record carries a usable vehicle position
    pub fn has_gps(&self) -> bool {
        self.vehicle_lat.is_some() && self.vehicle_lon.is_some()
    }
}

/// Generate a globally unique detection id
pub fn generate_detection_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a session id when none is configured
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> DetectionPayload {
        DetectionPayload {
            frame_number: 75,
            timestamp_sec: 2.5,
            pixel_u: 1737.28,
            pixel_v: 630.06,
            confidence: 0.5249,
            class_name: "stop sign".to_string(),
            video_name: None,
            gps: GpsFix::default(),
        }
    }

    #[test]
    fn test_ingest_generates_unique_ids() {
        let a = DetectionRecord::ingest(payload(), "vehicle-001", "session-001");
        let b = DetectionRecord::ingest(payload(), "vehicle-001", "session-001");
        assert_ne!(a.detection_id, b.detection_id);
        assert!(Uuid::parse_str(&a.detection_id).is_ok());
    }

    #[test]
    fn test_computed_fields_are_empty_at_ingestion() {
        let record = DetectionRecord::ingest(payload(), "v", "s");
        assert!(record.object_lat.is_none());
        assert!(record.object_lon.is_none());
        assert!(record.distance.is_none());
        assert!(record.roi_image_path.is_none());
    }

    #[test]
    fn test_null_fields_are_omitted_from_json() {
        let record = DetectionRecord::with_id("test-456", payload(), "vehicle-002", "session-002");
        let json = serde_json::to_value(&record).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj["detection_id"], "test-456");
        assert_eq!(obj["frame_number"], 75);
        assert_eq!(obj["class_name"], "stop sign");
        assert!(!obj.contains_key("vehicle_lat"));
        assert!(!obj.contains_key("object_lat"));
        assert!(!obj.contains_key("video_name"));
    }

    #[test]
    fn test_gps_fields_serialized_when_present() {
        let mut p = payload();
        p.gps = GpsFix {
            vehicle_lat: Some(43.85),
            vehicle_lon: Some(-79.33),
            heading: None,
            recording_timestamp: Some("2025-01-01T00:00:00Z".to_string()),
        };
        let record = DetectionRecord::ingest(p, "v", "s");
        assert!(record.has_gps());

        let json = serde_json::to_string(&record).unwrap();
        let parsed: DetectionRecord = serde_json::from_str(&json).unwrap();
        assert!((parsed.vehicle_lat.unwrap() - 43.85).abs() < 1e-9);
        assert_eq!(parsed.recording_timestamp.as_deref(), Some("2025-01-01T00:00:00Z"));
    }
}
