//! Input schema: `hanp_msgs/TrackedHumans` and friends.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geometry::{AccelWithCovariance, Header, PoseWithCovariance, TwistWithCovariance};

/// Body-part tag of a [`TrackedSegment`] (`hanp_msgs/TrackedSegmentType`).
///
/// Kept as the raw wire integer so unknown tags survive decoding. They never
/// compare equal to a named constant, so they simply never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentType(pub i8);

impl SegmentType {
    pub const HEAD: Self = Self(0);
    pub const TORSO: Self = Self(1);
    pub const RIGHT_HAND: Self = Self(2);
    pub const LEFT_HAND: Self = Self(3);

    const NAMED: [(&'static str, SegmentType); 4] = [
        ("head", Self::HEAD),
        ("torso", Self::TORSO),
        ("right_hand", Self::RIGHT_HAND),
        ("left_hand", Self::LEFT_HAND),
    ];

    /// Lower-case name for the known tags.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(_, t)| *t == self)
            .map(|(name, _)| *name)
    }
}

impl Default for SegmentType {
    fn default() -> Self {
        Self::TORSO
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "segment#{}", self.0),
        }
    }
}

impl FromStr for SegmentType {
    type Err = String;

    /// Accepts either the raw integer (`"1"`) or a case-insensitive name
    /// (`"TORSO"`, `"right_hand"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(raw) = s.parse::<i8>() {
            return Ok(Self(raw));
        }
        let lower = s.to_ascii_lowercase();
        Self::NAMED
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, t)| *t)
            .ok_or_else(|| format!("unknown segment type '{s}'"))
    }
}

/// One body part's estimated pose and velocity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedSegment {
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
    pub pose: PoseWithCovariance,
    pub twist: TwistWithCovariance,
    #[serde(default)]
    pub accel: AccelWithCovariance,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedHuman {
    pub track_id: u64,
    #[serde(default)]
    pub segments: Vec<TrackedSegment>,
}

/// A batch of tracked humans, delivered atomically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedHumans {
    #[serde(default)]
    pub header: Header,
    #[serde(default)]
    pub humans: Vec<TrackedHuman>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_type_parses_names_and_integers() {
        assert_eq!("torso".parse::<SegmentType>().unwrap(), SegmentType::TORSO);
        assert_eq!("HEAD".parse::<SegmentType>().unwrap(), SegmentType::HEAD);
        assert_eq!("3".parse::<SegmentType>().unwrap(), SegmentType::LEFT_HAND);
        assert_eq!("42".parse::<SegmentType>().unwrap(), SegmentType(42));
        assert!("elbow".parse::<SegmentType>().is_err());
    }

    #[test]
    fn segment_type_display() {
        assert_eq!(SegmentType::RIGHT_HAND.to_string(), "right_hand");
        assert_eq!(SegmentType(-1).to_string(), "segment#-1");
    }

    #[test]
    fn tracked_humans_decodes_rosbridge_json() {
        let json = r#"{
            "header": {"seq": 4, "stamp": {"secs": 10, "nsecs": 5}, "frame_id": "odom"},
            "humans": [{
                "track_id": 7,
                "segments": [{
                    "type": 1,
                    "pose": {"pose": {"position": {"x": 1, "y": 2, "z": 3},
                                      "orientation": {"x": 0, "y": 0, "z": 0, "w": 1}},
                             "covariance": [0.5]},
                    "twist": {"twist": {"linear": {"x": 0.1, "y": 0, "z": 0},
                                        "angular": {"x": 0, "y": 0, "z": 0}},
                              "covariance": []}
                }]
            }]
        }"#;
        let batch: TrackedHumans = serde_json::from_str(json).unwrap();
        assert_eq!(batch.header.frame_id, "odom");
        assert_eq!(batch.humans.len(), 1);
        let seg = &batch.humans[0].segments[0];
        assert_eq!(seg.segment_type, SegmentType::TORSO);
        assert_eq!(seg.pose.covariance, vec![0.5]);
        assert!((seg.twist.twist.linear.x - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_object_is_an_empty_batch() {
        let batch: TrackedHumans = serde_json::from_str("{}").unwrap();
        assert!(batch.humans.is_empty());
    }
}
