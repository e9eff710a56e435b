//! Fallback lifecycle events
//!
//! The orchestrator reports every attempt, failure, skip and terminal outcome
//! to an [`EventSink`]. Production wires in the Prometheus
//! [`Metrics`](crate::metrics::Metrics); tests use [`RecordingSink`].

use crate::error::ErrorKind;
use parking_lot::Mutex;
use std::time::Duration;

/// Why a candidate was passed over without being called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Id is in the priority store but has no descriptor in the config
    Unconfigured,
    /// Availability gate rejected the credential
    Unavailable,
    /// Adapter could not be constructed
    InitFailed,
}

impl SkipReason {
    pub const ALL: [SkipReason; 3] = [
        SkipReason::Unconfigured,
        SkipReason::Unavailable,
        SkipReason::InitFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Unavailable => "unavailable",
            Self::InitFailed => "init_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackEvent {
    Attempted {
        provider_id: String,
        attempt: usize,
    },
    Succeeded {
        provider_id: String,
        total_attempts: usize,
        fallback_used: bool,
        elapsed: Duration,
    },
    Failed {
        provider_id: String,
        attempt: usize,
        kind: ErrorKind,
    },
    Skipped {
        provider_id: String,
        reason: SkipReason,
    },
    /// Terminal failure; `last_kind` is `None` when nothing was ever called
    Exhausted {
        total_attempts: usize,
        last_kind: Option<ErrorKind>,
        elapsed: Duration,
    },
}

/// Receiver for orchestration events
///
/// Called inline on the request path, so implementations must not block.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &FallbackEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&self, _event: &FallbackEvent) {}
}

/// Keeps every event in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<FallbackEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<FallbackEvent> {
        self.events.lock().clone()
    }

    /// Provider ids of `Attempted` events, in order
    pub fn attempted(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                FallbackEvent::Attempted { provider_id, .. } => Some(provider_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &FallbackEvent) {
        self.events.lock().push(event.clone());
    }
}
