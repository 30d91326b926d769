// Bus module
// Frame delivery into the engine and gesture fan-out to consumers

pub mod hub;

pub use hub::{Hub, Subscription};

use crate::gestures::GestureEvent;
use crate::landmarks::Frame;

/// Push-based landmark feed: one `Frame` per camera tick
pub type LandmarkStream = Hub<Frame>;

/// Fan-out bus receiving every emitted gesture
pub type EventBus = Hub<GestureEvent>;

pub fn landmark_stream() -> LandmarkStream {
    Hub::new("landmarks")
}

pub fn event_bus() -> EventBus {
    Hub::new("gestures")
}
