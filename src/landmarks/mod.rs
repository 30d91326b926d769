// Landmark input module
// Frame data model and the validity filter that gates every classifier

pub mod ingest;
pub mod types;

pub use ingest::{is_visible, validate_frame, InvalidFrame};
pub use types::{BodyPoint, Frame, LandmarkSample, PosePoints};
