//! Fire-and-forget analytics events
//!
//! Widgets report what the user did (saved, uploaded, cleared) to a
//! [`TelemetrySink`]. Sinks never fail and never block.

use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};

pub const TELEMETRY_TARGET: &str = "syncnote::telemetry";

/// One analytics event: a name plus flat parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub name: String,
    pub params: Map<String, Value>,
}

impl TelemetryEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// Where telemetry events go
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Emits each event as a `tracing` record under [`TELEMETRY_TARGET`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: TelemetryEvent) {
        // Bound outside the macro, where `Value` would name tracing's trait
        let params = Value::Object(event.params);
        tracing::info!(
            target: TELEMETRY_TARGET,
            event = %event.name,
            params = %params,
        );
    }
}

/// Drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Keeps every event in memory, for tests and diagnostics
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.name).collect()
    }

    /// Most recent event with this name
    pub fn last(&self, name: &str) -> Option<TelemetryEvent> {
        self.events().into_iter().rev().find(|e| e.name == name)
    }
}

impl TelemetrySink for RecordingSink {
    fn emit(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
