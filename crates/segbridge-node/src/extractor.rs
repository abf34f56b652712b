//! [`SegmentExtractor`] – HANP tracked humans to IRI detections.
//!
//! Each tracked human is reduced to the first of its segments whose type
//! matches the configured target; that segment's position, covariance and
//! linear velocity become one [`Detection`].  Humans without a matching
//! segment are skipped.
//!
//! # Example
//!
//! ```rust
//! use segbridge_node::extractor::{ExtractorConfig, SegmentExtractor};
//! use segbridge_types::{SegmentType, TrackedHuman, TrackedHumans, TrackedSegment};
//!
//! let extractor = SegmentExtractor::new(ExtractorConfig::default());
//! let batch = TrackedHumans {
//!     humans: vec![TrackedHuman {
//!         track_id: 7,
//!         segments: vec![TrackedSegment {
//!             segment_type: SegmentType::TORSO,
//!             ..Default::default()
//!         }],
//!     }],
//!     ..Default::default()
//! };
//!
//! let out = extractor.transform(&batch);
//! assert_eq!(out.header.frame_id, "/map");
//! assert_eq!(out.detection[0].id, 7);
//! ```

use segbridge_types::{Detection, DetectionArray, Header, SegmentType, Time, TrackedHuman, TrackedHumans};
use serde::{Deserialize, Serialize};

/// Frame every output batch is labelled with.
pub const OUTPUT_FRAME_ID: &str = "/map";

/// Startup configuration for [`SegmentExtractor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Body segment to extract from every human.
    pub target_segment_type: SegmentType,
}

/// Stateless converter; the target segment type is fixed at construction.
#[derive(Debug, Clone)]
pub struct SegmentExtractor {
    config: ExtractorConfig,
}

impl SegmentExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn target(&self) -> SegmentType {
        self.config.target_segment_type
    }

    /// Convert `batch`, stamping the result with the current wall-clock time.
    pub fn transform(&self, batch: &TrackedHumans) -> DetectionArray {
        self.transform_at(batch, Time::now())
    }

    /// Convert `batch`, stamping the result with `stamp`.
    ///
    /// Output order follows input human order.  The input header is not
    /// propagated.
    pub fn transform_at(&self, batch: &TrackedHumans, stamp: Time) -> DetectionArray {
        DetectionArray {
            header: Header {
                seq: 0,
                stamp,
                frame_id: OUTPUT_FRAME_ID.to_string(),
            },
            detection: batch.humans.iter().filter_map(|h| self.extract(h)).collect(),
        }
    }

    /// Detection for a single human, from its first segment of the target
    /// type.
    pub fn extract(&self, human: &TrackedHuman) -> Option<Detection> {
        let segment = human
            .segments
            .iter()
            .find(|s| s.segment_type == self.config.target_segment_type)?;

        Some(Detection {
            id: human.track_id,
            position: segment.pose.pose.position,
            velocity: segment.twist.twist.linear,
            covariance: segment.pose.covariance.clone(),
        })
    }
}
