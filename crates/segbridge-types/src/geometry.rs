//! `std_msgs` / `geometry_msgs` building blocks shared by both message
//! families.
//!
//! Field names follow the JSON encoding produced by `rosbridge_server`, so a
//! decoded message can be re-encoded without renaming anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of entries in a row-major 6x6 covariance matrix.
pub const COVARIANCE_LEN: usize = 36;

/// ROS 1 wall-clock time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Time {
    pub secs: u32,
    pub nsecs: u32,
}

impl Time {
    pub fn new(secs: u32, nsecs: u32) -> Self {
        Self { secs, nsecs }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from(Utc::now())
    }
}

impl From<DateTime<Utc>> for Time {
    /// Times before the Unix epoch saturate to zero.
    fn from(t: DateTime<Utc>) -> Self {
        let secs = u32::try_from(t.timestamp().max(0)).unwrap_or(u32::MAX);
        Self {
            secs,
            nsecs: t.timestamp_subsec_nanos(),
        }
    }
}

/// Standard metadata for stamped messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub seq: u32,
    #[serde(default)]
    pub stamp: Time,
    #[serde(default)]
    pub frame_id: String,
}

/// The position of a point in free space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A vector in free space, anchored at the origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Orientation in quaternion form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    #[serde(default)]
    pub orientation: Quaternion,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    #[serde(default)]
    pub angular: Vector3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Accel {
    pub linear: Vector3,
    #[serde(default)]
    pub angular: Vector3,
}

fn zero_covariance() -> Vec<f64> {
    vec![0.0; COVARIANCE_LEN]
}

/// Pose with a row-major 6x6 uncertainty matrix.
///
/// The covariance length is carried as received: nothing in the pipeline
/// checks that it actually holds [`COVARIANCE_LEN`] entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    pub pose: Pose,
    #[serde(default = "zero_covariance")]
    pub covariance: Vec<f64>,
}

impl Default for PoseWithCovariance {
    fn default() -> Self {
        Self {
            pose: Pose::default(),
            covariance: zero_covariance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwistWithCovariance {
    pub twist: Twist,
    #[serde(default = "zero_covariance")]
    pub covariance: Vec<f64>,
}

impl Default for TwistWithCovariance {
    fn default() -> Self {
        Self {
            twist: Twist::default(),
            covariance: zero_covariance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccelWithCovariance {
    pub accel: Accel,
    #[serde(default = "zero_covariance")]
    pub covariance: Vec<f64>,
}

impl Default for AccelWithCovariance {
    fn default() -> Self {
        Self {
            accel: Accel::default(),
            covariance: zero_covariance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn time_from_datetime_splits_seconds_and_nanos() {
        let t = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        assert_eq!(Time::from(t), Time::new(1_700_000_000, 250_000_000));
    }

    #[test]
    fn time_before_epoch_saturates_to_zero() {
        let t = Utc.timestamp_opt(-5, 0).unwrap();
        assert_eq!(Time::from(t).secs, 0);
    }

    #[test]
    fn pose_with_covariance_defaults_missing_covariance() {
        let json = r#"{"pose":{"position":{"x":1.0,"y":2.0,"z":3.0}}}"#;
        let p: PoseWithCovariance = serde_json::from_str(json).unwrap();
        assert_eq!(p.pose.position, Point::new(1.0, 2.0, 3.0));
        assert_eq!(p.pose.orientation, Quaternion::default());
        assert_eq!(p.covariance.len(), COVARIANCE_LEN);
    }

    #[test]
    fn short_covariance_is_kept_as_is() {
        let json = r#"{"pose":{"position":{"x":0,"y":0,"z":0}},"covariance":[1.0,2.0]}"#;
        let p: PoseWithCovariance = serde_json::from_str(json).unwrap();
        assert_eq!(p.covariance, vec![1.0, 2.0]);
    }
}
