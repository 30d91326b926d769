// Landmark types
// Normalized body points as delivered by the upstream pose estimator

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum number of entries a pose landmark array needs to cover both wrists
pub const POSE_LANDMARK_COUNT: usize = 17;

/// Body points the engine knows how to read
/// Indices follow the MediaPipe Pose topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPoint {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
}

impl BodyPoint {
    /// All points, in pose-index order
    pub const ALL: [BodyPoint; 7] = [
        BodyPoint::Nose,
        BodyPoint::LeftShoulder,
        BodyPoint::RightShoulder,
        BodyPoint::LeftElbow,
        BodyPoint::RightElbow,
        BodyPoint::LeftWrist,
        BodyPoint::RightWrist,
    ];

    /// Index of this point in a MediaPipe Pose landmark array
    pub fn pose_index(&self) -> usize {
        match self {
            BodyPoint::Nose => 0,
            BodyPoint::LeftShoulder => 11,
            BodyPoint::RightShoulder => 12,
            BodyPoint::LeftElbow => 13,
            BodyPoint::RightElbow => 14,
            BodyPoint::LeftWrist => 15,
            BodyPoint::RightWrist => 16,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BodyPoint::Nose => "nose",
            BodyPoint::LeftShoulder => "left_shoulder",
            BodyPoint::RightShoulder => "right_shoulder",
            BodyPoint::LeftElbow => "left_elbow",
            BodyPoint::RightElbow => "right_elbow",
            BodyPoint::LeftWrist => "left_wrist",
            BodyPoint::RightWrist => "right_wrist",
        }
    }
}

/// A single tracked point in normalized image space
/// x and y are in [0, 1]; y grows downward
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSample {
    pub x: f64,
    pub y: f64,

    #[serde(default)]
    pub z: f64,

    /// Detector confidence [0.0, 1.0]; absent means fully visible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
}

impl LandmarkSample {
    pub fn new(x: f64, y: f64) -> Self {
        LandmarkSample {
            x,
            y,
            z: 0.0,
            visibility: None,
        }
    }

    pub fn with_visibility(x: f64, y: f64, visibility: f64) -> Self {
        LandmarkSample {
            x,
            y,
            z: 0.0,
            visibility: Some(visibility),
        }
    }
}

/// One camera tick worth of landmarks
/// Produced upstream at the camera rate; never mutated by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Capture time in milliseconds; every timing window is measured against this
    pub timestamp_ms: f64,

    pub points: BTreeMap<BodyPoint, LandmarkSample>,
}

impl Frame {
    /// Create an empty frame
    pub fn new(timestamp_ms: f64) -> Self {
        Frame {
            timestamp_ms,
            points: BTreeMap::new(),
        }
    }

    /// Builder-style point insertion
    pub fn with_point(mut self, point: BodyPoint, sample: LandmarkSample) -> Self {
        self.points.insert(point, sample);
        self
    }

    /// Build a frame from a raw MediaPipe Pose landmark array
    /// Arrays too short to reach the wrists produce a frame without them
    pub fn from_pose_landmarks(timestamp_ms: f64, landmarks: &[LandmarkSample]) -> Self {
        let mut frame = Frame::new(timestamp_ms);
        if landmarks.len() < POSE_LANDMARK_COUNT {
            return frame;
        }

        for point in BodyPoint::ALL {
            if let Some(sample) = landmarks.get(point.pose_index()) {
                frame.points.insert(point, *sample);
            }
        }

        frame
    }

    pub fn get(&self, point: BodyPoint) -> Option<&LandmarkSample> {
        self.points.get(&point)
    }
}

/// The four required points of a frame that passed validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PosePoints {
    pub left_shoulder: LandmarkSample,
    pub right_shoulder: LandmarkSample,
    pub left_wrist: LandmarkSample,
    pub right_wrist: LandmarkSample,
}

impl PosePoints {
    /// Horizontal distance between the shoulders
    pub fn shoulder_width(&self) -> f64 {
        (self.right_shoulder.x - self.left_shoulder.x).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pose_landmarks_maps_indices() {
        let mut raw = vec![LandmarkSample::new(0.0, 0.0); 33];
        raw[11] = LandmarkSample::new(0.4, 0.5);
        raw[12] = LandmarkSample::new(0.6, 0.5);
        raw[15] = LandmarkSample::new(0.35, 0.7);
        raw[16] = LandmarkSample::new(0.65, 0.72);

        let frame = Frame::from_pose_landmarks(10.0, &raw);

        assert_eq!(frame.timestamp_ms, 10.0);
        assert_eq!(frame.get(BodyPoint::LeftShoulder).unwrap().x, 0.4);
        assert_eq!(frame.get(BodyPoint::RightWrist).unwrap().y, 0.72);
        assert_eq!(frame.points.len(), BodyPoint::ALL.len());
    }

    #[test]
    fn test_short_landmark_array_yields_empty_frame() {
        let raw = vec![LandmarkSample::new(0.5, 0.5); 12];
        let frame = Frame::from_pose_landmarks(0.0, &raw);
        assert!(frame.points.is_empty());
    }

    #[test]
    fn test_frame_json_shape() {
        let frame = Frame::new(33.0)
            .with_point(BodyPoint::LeftWrist, LandmarkSample::with_visibility(0.3, 0.6, 0.9));

        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["points"]["left_wrist"]["visibility"], 0.9);

        let parsed: Frame = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_missing_visibility_and_z_default() {
        let sample: LandmarkSample = serde_json::from_str(r#"{"x":0.1,"y":0.2}"#).unwrap();
        assert_eq!(sample.z, 0.0);
        assert!(sample.visibility.is_none());
    }
}
