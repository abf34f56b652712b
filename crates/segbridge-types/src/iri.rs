//! Output schema: `iri_perception_msgs/detectionArray`.

use serde::{Deserialize, Serialize};

use crate::geometry::{Header, Point, Vector3};

/// One detected person as the IRI perception stack consumes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: u64,
    pub position: Point,
    pub velocity: Vector3,
    #[serde(rename = "covariances")]
    pub covariance: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionArray {
    pub header: Header,
    pub detection: Vec<Detection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_serialises_covariance_under_wire_name() {
        let d = Detection {
            id: 3,
            covariance: vec![1.0],
            ..Default::default()
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["covariances"][0], 1.0);
        assert!(json.get("covariance").is_none());
    }
}
