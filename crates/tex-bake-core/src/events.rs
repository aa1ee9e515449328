//! Progress events emitted outward to a caller-supplied sink. The core
//! never renders anything; display belongs to the consuming collaborator.

use serde_json::Value;

use crate::node::{PackStatus, ProcessingResult};

/// One per-pack status notification.
#[derive(Debug, Clone)]
pub struct PackEvent {
    /// Canonical pack name.
    pub pack: String,
    pub status: PackStatus,
    /// Present on terminal events.
    pub metadata: Option<Vec<(String, Value)>>,
    /// Captured log text, present on terminal events.
    pub log: Option<String>,
    /// Display-ready error text, present on failure.
    pub error: Option<String>,
}

impl PackEvent {
    pub fn started(pack: &str) -> Self {
        Self {
            pack: pack.to_string(),
            status: PackStatus::Running,
            metadata: None,
            log: None,
            error: None,
        }
    }

    pub fn finished(result: &ProcessingResult) -> Self {
        Self {
            pack: result.pack.clone(),
            status: result.status,
            metadata: Some(result.metadata.clone()),
            log: Some(result.log.clone()),
            error: result.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Observer for pack progress. Implementations must tolerate delivery from
/// worker threads.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: PackEvent);
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_event(&self, _event: PackEvent) {}
}

/// Adapter turning a plain closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> ProgressSink for FnSink<F>
where
    F: Fn(PackEvent) + Send + Sync,
{
    fn on_event(&self, event: PackEvent) {
        (self.0)(event)
    }
}
