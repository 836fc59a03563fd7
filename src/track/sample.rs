// src/track/sample.rs
//! Core data model: position samples, assignments and capacity reports

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One GPS fix recorded for an assignment. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp_utc: DateTime<Utc>,
    pub speed_kmh: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_meters: Option<f64>,
    /// Marked by the operator as a collection point of interest
    #[serde(default)]
    pub highlighted: bool,
    /// Vehicle reported a return to its base station; segment boundary
    #[serde(default)]
    pub is_return_event: bool,
    pub assignment_id: String,
}

impl PositionSample {
    pub fn new(
        latitude: f64,
        longitude: f64,
        timestamp_utc: DateTime<Utc>,
        speed_kmh: f64,
        assignment_id: impl Into<String>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            timestamp_utc,
            speed_kmh,
            accuracy_meters: None,
            highlighted: false,
            is_return_event: false,
            assignment_id: assignment_id.into(),
        }
    }

    /// Whether this fix shares coordinates with another (used to collapse
    /// consecutive duplicates during replay)
    pub fn same_coordinates(&self, other: &PositionSample) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

/// Reference to the operator driving the vehicle for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "ref")]
pub enum OperatorRef {
    Internal(String),
    External(String),
}

/// A capacity reading reported at a return to station ("half full", "full", ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityReport {
    pub label: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// One vehicle/operator/day tracking session. Owned exclusively by the device
/// while the session is live; a differing backend id supersedes it instead of
/// mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub device_id: String,
    pub operator: OperatorRef,
    pub date: NaiveDate,
    #[serde(default)]
    pub fixes: Vec<PositionSample>,
    #[serde(default)]
    pub collection_points: Vec<PositionSample>,
    #[serde(default)]
    pub capacity_reports: Vec<CapacityReport>,
}

impl Assignment {
    pub fn new(
        id: impl Into<String>,
        device_id: impl Into<String>,
        operator: OperatorRef,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            device_id: device_id.into(),
            operator,
            date,
            fixes: Vec::new(),
            collection_points: Vec::new(),
            capacity_reports: Vec::new(),
        }
    }

    /// Fixes the vehicle flagged as return-to-station events, in order
    pub fn return_markers(&self) -> Vec<PositionSample> {
        self.fixes
            .iter()
            .filter(|f| f.is_return_event)
            .cloned()
            .collect()
    }

    /// Whether a backend assignment supersedes this one
    pub fn is_superseded_by(&self, remote: &Assignment) -> bool {
        self.id != remote.id
    }
}
