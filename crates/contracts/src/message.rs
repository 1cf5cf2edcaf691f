//! Message - wire envelope derived 1:1 from a DetectionRecord

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ContractError, DetectionRecord};

/// Routing header names, in wire order
pub const HEADER_VEHICLE_ID: &str = "vehicle_id";
pub const HEADER_SESSION_ID: &str = "session_id";
pub const HEADER_CLASS_NAME: &str = "class_name";

/// Pipeline-local message identifier
///
/// Distinct from the message key: submitting the same detection twice yields
/// two messages with the same key but different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Routing header, readable without deserializing the body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Broker message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Destination topic
    pub topic: String,

    /// Message key (= detection id)
    pub key: String,

    /// Serialized DetectionRecord (JSON)
    pub payload: Bytes,

    /// Routing headers
    pub headers: Vec<Header>,
}

impl Message {
    /// Build the envelope for a detection
    ///
    /// # Errors
    /// Returns `ContractError::Serialization` if the record cannot be encoded.
    pub fn from_record(record: &DetectionRecord, topic: &str) -> Result<Self, ContractError> {
        let payload = serde_json::to_vec(record)
            .map_err(|e| ContractError::serialization(&record.detection_id, e.to_string()))?;

        Ok(Self {
            topic: topic.to_string(),
            key: record.detection_id.clone(),
            payload: Bytes::from(payload),
            headers: vec![
                Header::new(HEADER_VEHICLE_ID, &record.vehicle_id),
                Header::new(HEADER_SESSION_ID, &record.session_id),
                Header::new(HEADER_CLASS_NAME, &record.class_name),
            ],
        })
    }

    /// Look up a header value by name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }

    /// Approximate wire size (key + body + headers)
    pub fn size(&self) -> usize {
        self.key.len()
            + self.payload.len()
            + self
                .headers
                .iter()
                .map(|h| h.name.len() + h.value.len())
                .sum::<usize>()
    }

    /// Decode the body back into a record
    pub fn decode(&self) -> Result<DetectionRecord, ContractError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| ContractError::serialization(&self.key, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DetectionPayload, GpsFix};

    fn record(id: &str) -> DetectionRecord {
        DetectionRecord::with_id(
            id,
            DetectionPayload {
                frame_number: 1,
                timestamp_sec: 0.04,
                pixel_u: 10.0,
                pixel_v: 20.0,
                confidence: 0.9,
                class_name: "traffic light".to_string(),
                video_name: Some("drive_01.mp4".to_string()),
                gps: GpsFix::default(),
            },
            "vehicle-001",
            "session-abc",
        )
    }

    #[test]
    fn test_message_keyed_by_detection_id() {
        let msg = Message::from_record(&record("det-1"), "traffic-sign-detections").unwrap();
        assert_eq!(msg.key, "det-1");
        assert_eq!(msg.topic, "traffic-sign-detections");
    }

    #[test]
    fn test_routing_headers() {
        let msg = Message::from_record(&record("det-1"), "t").unwrap();
        let names: Vec<_> = msg.headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["vehicle_id", "session_id", "class_name"]);
        assert_eq!(msg.header(HEADER_VEHICLE_ID), Some("vehicle-001"));
        assert_eq!(msg.header(HEADER_SESSION_ID), Some("session-abc"));
        assert_eq!(msg.header(HEADER_CLASS_NAME), Some("traffic light"));
        assert_eq!(msg.header("missing"), None);
    }

    #[test]
    fn test_body_carries_full_record() {
        let original = record("det-2");
        let msg = Message::from_record(&original, "t").unwrap();
        let decoded = msg.decode().unwrap();
        assert_eq!(decoded.detection_id, original.detection_id);
        assert_eq!(decoded.frame_number, original.frame_number);
        assert_eq!(decoded.class_name, original.class_name);
        assert_eq!(decoded.video_name, original.video_name);
        assert_eq!(decoded.ingested_at, original.ingested_at);
    }

    #[test]
    fn test_same_record_twice_gives_same_key() {
        let r = record("det-3");
        let a = Message::from_record(&r, "t").unwrap();
        let b = Message::from_record(&r, "t").unwrap();
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn test_message_id_display() {
        assert_eq!(MessageId(42).to_string(), "msg-42");
    }
}
