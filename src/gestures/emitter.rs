// Event emission
// Stamps classifier firings into events, keeps per-kind cooldown bookkeeping,
// and fans results out to debug observers and the event bus

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::bus::{EventBus, Hub};
use crate::gestures::types::{round3, DebugRecord, GestureEvent, GestureKind, Metadata};

/// A classifier decision to fire, before it becomes an event
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub kind: GestureKind,
    pub timestamp_ms: f64,

    /// When the classifier will accept this gesture again
    pub cooldown_until_ms: f64,

    pub metadata: Metadata,
}

impl Firing {
    pub fn new(kind: GestureKind, timestamp_ms: f64, cooldown_until_ms: f64, metadata: Metadata) -> Self {
        Firing {
            kind,
            timestamp_ms,
            cooldown_until_ms,
            metadata,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CooldownEntry {
    fired_at_ms: f64,
    until_ms: f64,
}

/// Last firing and refractory deadline per gesture kind
#[derive(Debug, Default)]
pub struct CooldownLedger {
    entries: HashMap<GestureKind, CooldownEntry>,
}

impl CooldownLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a firing; returns the time since the previous firing of this kind
    pub fn record(&mut self, kind: GestureKind, fired_at_ms: f64, until_ms: f64) -> Option<f64> {
        let previous = self.entries.insert(kind, CooldownEntry { fired_at_ms, until_ms });
        previous.map(|p| fired_at_ms - p.fired_at_ms)
    }

    /// Remaining refractory time for `kind` at `now_ms` (0 when free)
    pub fn remaining(&self, kind: GestureKind, now_ms: f64) -> f64 {
        self.entries
            .get(&kind)
            .map(|e| (e.until_ms - now_ms).max(0.0))
            .unwrap_or(0.0)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Output boundary of the engine
pub struct EventEmitter {
    bus: EventBus,
    debug: Hub<DebugRecord>,
    ledger: RefCell<CooldownLedger>,
    enabled: Cell<bool>,
}

impl EventEmitter {
    pub fn new(bus: EventBus) -> Self {
        EventEmitter {
            bus,
            debug: Hub::new("debug"),
            ledger: RefCell::new(CooldownLedger::new()),
            enabled: Cell::new(true),
        }
    }

    /// Register a debug observer; it sees every classifier decision
    pub fn debug_hub(&self) -> &Hub<DebugRecord> {
        &self.debug
    }

    /// Turn a firing into an event and record its cooldown
    pub fn stamp(&self, firing: Firing) -> GestureEvent {
        let Firing {
            kind,
            timestamp_ms,
            cooldown_until_ms,
            mut metadata,
        } = firing;

        let since_last = self
            .ledger
            .borrow_mut()
            .record(kind, timestamp_ms, cooldown_until_ms);

        metadata.insert("timestamp".to_string(), timestamp_ms.into());
        metadata.insert("cooldownUntilMs".to_string(), cooldown_until_ms.into());
        if let Some(since) = since_last {
            metadata.insert("sinceLastMs".to_string(), round3(since).into());
        }
        if let Some(intent) = kind.tempo_intent() {
            metadata.insert("intent".to_string(), intent.into());
        }

        log::debug!("{} {}", kind.debug_name(), serde_json::Value::Object(metadata.clone()));

        GestureEvent::new(kind, timestamp_ms, metadata)
    }

    /// Notify debug observers, then publish events to the bus
    /// Stops as soon as the emitter is disabled, even mid-batch
    pub fn deliver(&self, events: &[GestureEvent], diagnostics: Vec<DebugRecord>) {
        for record in diagnostics {
            if !self.enabled.get() {
                return;
            }
            self.debug.publish(&record);
        }

        for event in events {
            if !self.enabled.get() {
                return;
            }
            let record = DebugRecord::new(event.kind.debug_name(), event.timestamp_ms, event.metadata.clone());
            self.debug.publish(&record);

            if !self.enabled.get() {
                return;
            }
            self.bus.publish(event);
        }
    }

    pub fn cooldown_remaining(&self, kind: GestureKind, now_ms: f64) -> f64 {
        self.ledger.borrow().remaining(kind, now_ms)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// Forget cooldowns and drop every debug observer
    pub fn reset(&self) {
        self.ledger.borrow_mut().clear();
        self.debug.clear();
    }
}
