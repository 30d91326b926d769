// Gesture types
// Gesture kinds, emitted events, and the diagnostic records sent to debug observers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form diagnostic payload attached to events and debug records
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Body side, from the subject's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Recognized gestures
/// Each maps to a control action in the music host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GestureKind {
    /// Left wrist raised above the shoulder and dropped back
    /// Toggles the drums layer
    TapLeft,

    /// Right wrist raised above the shoulder and dropped back
    /// Toggles the melody layer
    TapRight,

    /// Fast upward burst of the right wrist (tempo up)
    FlickUp,

    /// Fast downward burst of the right wrist (tempo down)
    FlickDown,

    /// Both wrists chopped down together (play/pause)
    Halt,
}

impl GestureKind {
    pub const ALL: [GestureKind; 5] = [
        GestureKind::TapLeft,
        GestureKind::TapRight,
        GestureKind::FlickUp,
        GestureKind::FlickDown,
        GestureKind::Halt,
    ];

    pub fn tap(side: Side) -> Self {
        match side {
            Side::Left => GestureKind::TapLeft,
            Side::Right => GestureKind::TapRight,
        }
    }

    /// Topic published on the event bus
    pub fn topic(&self) -> &'static str {
        match self {
            GestureKind::TapLeft => "gesture.waveLeft",
            GestureKind::TapRight => "gesture.waveRight",
            GestureKind::FlickUp => "gesture.flickRightUp",
            GestureKind::FlickDown => "gesture.flickRightDown",
            GestureKind::Halt => "gesture.halt",
        }
    }

    /// Name reported to debug observers when the gesture fires
    pub fn debug_name(&self) -> &'static str {
        match self {
            GestureKind::TapLeft => "tap.drums",
            GestureKind::TapRight => "tap.melody",
            GestureKind::FlickUp => "flick.up",
            GestureKind::FlickDown => "flick.down",
            GestureKind::Halt => "halt.chop",
        }
    }

    /// Tempo intent carried alongside flicks
    pub fn tempo_intent(&self) -> Option<&'static str> {
        match self {
            GestureKind::FlickUp => Some("voice.faster"),
            GestureKind::FlickDown => Some("voice.slower"),
            _ => None,
        }
    }
}

/// A fired gesture, as delivered to the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    /// Unique identifier for this firing
    pub id: Uuid,

    pub kind: GestureKind,

    /// Frame timestamp (ms) at which the gesture fired
    pub timestamp_ms: f64,

    /// Classifier measurements behind the decision
    pub metadata: Metadata,
}

impl GestureEvent {
    /// Create a new event with generated UUID
    pub fn new(kind: GestureKind, timestamp_ms: f64, metadata: Metadata) -> Self {
        GestureEvent {
            id: Uuid::new_v4(),
            kind,
            timestamp_ms,
            metadata,
        }
    }

    pub fn topic(&self) -> &'static str {
        self.kind.topic()
    }
}

/// One classifier decision reported on the debug side channel
/// Covers firings and non-firing measurements alike
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugRecord {
    pub name: String,
    pub timestamp_ms: f64,
    pub metadata: Metadata,
}

impl DebugRecord {
    pub fn new(name: impl Into<String>, timestamp_ms: f64, metadata: Metadata) -> Self {
        DebugRecord {
            name: name.into(),
            timestamp_ms,
            metadata,
        }
    }
}

/// Unwrap a `json!({...})` literal into metadata
pub(crate) fn to_metadata(value: serde_json::Value) -> Metadata {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Metadata::new(),
    }
}

/// Round to three decimals for readable diagnostics
pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tap_kind_per_side() {
        assert_eq!(GestureKind::tap(Side::Left), GestureKind::TapLeft);
        assert_eq!(GestureKind::tap(Side::Right), GestureKind::TapRight);
    }

    #[test]
    fn test_only_flicks_carry_tempo_intent() {
        for kind in GestureKind::ALL {
            let is_flick = matches!(kind, GestureKind::FlickUp | GestureKind::FlickDown);
            assert_eq!(kind.tempo_intent().is_some(), is_flick);
        }
        assert_eq!(GestureKind::FlickUp.tempo_intent(), Some("voice.faster"));
    }

    #[test]
    fn test_event_creation() {
        let mut meta = Metadata::new();
        meta.insert("timeDiff".to_string(), 120.into());

        let event = GestureEvent::new(GestureKind::Halt, 250.0, meta);

        assert_eq!(event.topic(), "gesture.halt");
        assert_eq!(event.timestamp_ms, 250.0);
        assert_eq!(event.metadata["timeDiff"], 120);
    }

    #[test]
    fn test_round3() {
        assert_eq!(round3(0.123456), 0.123);
        assert_eq!(round3(-1.6667), -1.667);
    }
}
