// Landmark ingestion
// Validity filter run once per frame before any classifier sees it

use thiserror::Error;

use crate::landmarks::types::{BodyPoint, Frame, LandmarkSample, PosePoints};

/// Why a frame was skipped
/// Not a failure: an invalid frame just means "no decision this tick"
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidFrame {
    #[error("Non-numeric frame timestamp: {0}")]
    BadTimestamp(f64),

    #[error("Missing landmark: {}", .0.name())]
    Missing(BodyPoint),

    #[error("Non-numeric coordinates for {}", .0.name())]
    NonFinite(BodyPoint),

    #[error("Low visibility for {}: {visibility:.2}", .point.name())]
    LowVisibility { point: BodyPoint, visibility: f64 },
}

/// A sample is usable when its visibility is absent or strictly above the minimum
pub fn is_visible(sample: &LandmarkSample, min_visibility: f64) -> bool {
    match sample.visibility {
        None => true,
        Some(v) => v > min_visibility,
    }
}

fn require(frame: &Frame, point: BodyPoint, min_visibility: f64) -> Result<LandmarkSample, InvalidFrame> {
    let sample = frame.get(point).copied().ok_or(InvalidFrame::Missing(point))?;

    if !sample.x.is_finite() || !sample.y.is_finite() {
        return Err(InvalidFrame::NonFinite(point));
    }

    if !is_visible(&sample, min_visibility) {
        return Err(InvalidFrame::LowVisibility {
            point,
            visibility: sample.visibility.unwrap_or(0.0),
        });
    }

    Ok(sample)
}

/// Extract the four required points, or report the first reason the frame is unusable
pub fn validate_frame(frame: &Frame, min_visibility: f64) -> Result<PosePoints, InvalidFrame> {
    if !frame.timestamp_ms.is_finite() {
        return Err(InvalidFrame::BadTimestamp(frame.timestamp_ms));
    }

    Ok(PosePoints {
        left_shoulder: require(frame, BodyPoint::LeftShoulder, min_visibility)?,
        right_shoulder: require(frame, BodyPoint::RightShoulder, min_visibility)?,
        left_wrist: require(frame, BodyPoint::LeftWrist, min_visibility)?,
        right_wrist: require(frame, BodyPoint::RightWrist, min_visibility)?,
    })
}
