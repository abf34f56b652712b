//! `segbridge-types` – wire schemas and shared primitives.
//!
//! # Modules
//!
//! - [`geometry`] – `std_msgs` / `geometry_msgs` building blocks.
//! - [`hanp`] – input schema ([`TrackedHumans`]).
//! - [`iri`] – output schema ([`DetectionArray`]).

pub mod geometry;
pub mod hanp;
pub mod iri;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use geometry::{
    Accel, AccelWithCovariance, COVARIANCE_LEN, Header, Point, Pose, PoseWithCovariance,
    Quaternion, Time, Twist, TwistWithCovariance, Vector3,
};
pub use hanp::{SegmentType, TrackedHuman, TrackedHumans, TrackedSegment};
pub use iri::{Detection, DetectionArray};

/// Unified envelope for everything routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "segbridge-middleware::rosbridge/hanp_to_iri_converter/in_humans"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Message families that can travel over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    TrackedHumans(TrackedHumans),
    Detections(DetectionArray),
}

/// Workspace-wide error type.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Parsing Error: {0}")]
    Parsing(String),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}
