//! Progress Emitter (spec §4.H). Fire-and-forget callback protocol the
//! engine uses to report iteration progress to a caller. Grounded on
//! `original_source/.../selfquery_llm.py::_notify_progress` and the wire
//! shape `original_source/.../selfquery_llm.py` (pipeline)'s
//! `_build_status_data` consumes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use serde::Serialize;
use tracing::error;

/// The closed set of stages a `process()` call reports, spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Start,
    SchemaMetadata,
    SchemaTtl,
    IterationStart,
    IterationCandidates,
    IterationExecuted,
    IterationStop,
    Error,
    Complete,
}

/// One progress update, emitted at a stage transition.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub description: String,
    pub done: bool,
    pub payload: serde_json::Value,
    pub emitted_at: chrono::DateTime<chrono::Utc>,
}

impl ProgressEvent {
    #[must_use]
    pub fn new(stage: ProgressStage, description: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            stage,
            description: description.into(),
            done: false,
            payload,
            emitted_at: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn done(mut self) -> Self {
        self.done = true;
        self
    }
}

/// A caller-supplied progress callback. Not a channel: the engine calls it
/// synchronously and inline, matching the original's direct callback
/// invocation rather than a queued event bus.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Invoke `sink` with `event`, catching (and logging) any panic from the
/// callback so a misbehaving caller can never abort retrieval. Mirrors
/// `_notify_progress`'s `try/except` in spirit: Rust has no catchable
/// exceptions across this boundary, so `catch_unwind` is the closest
/// equivalent, and the contract documents that sinks must not panic.
pub fn emit(sink: &ProgressSink, event: ProgressEvent) {
    let sink = sink.clone();
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| sink(event)));
    if let Err(panic) = result {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(panic = %message, "progress sink panicked; continuing retrieval");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_calls_sink_with_event() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let sink: ProgressSink = Arc::new(move |_event| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        emit(&sink, ProgressEvent::new(ProgressStage::IterationStart, "planning", serde_json::json!({})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_survives_a_panicking_sink() {
        let sink: ProgressSink = Arc::new(|_event| panic!("boom"));
        emit(&sink, ProgressEvent::new(ProgressStage::Error, "oops", serde_json::json!({})));
    }

    #[test]
    fn done_sets_the_done_flag() {
        let event = ProgressEvent::new(ProgressStage::Complete, "finished", serde_json::json!({})).done();
        assert!(event.done);
    }

    #[test]
    fn stage_serializes_to_spec_wire_names() {
        let names = [
            (ProgressStage::Start, "\"start\""),
            (ProgressStage::SchemaMetadata, "\"schema_metadata\""),
            (ProgressStage::SchemaTtl, "\"schema_ttl\""),
            (ProgressStage::IterationStart, "\"iteration_start\""),
            (ProgressStage::IterationCandidates, "\"iteration_candidates\""),
            (ProgressStage::IterationExecuted, "\"iteration_executed\""),
            (ProgressStage::IterationStop, "\"iteration_stop\""),
            (ProgressStage::Error, "\"error\""),
            (ProgressStage::Complete, "\"complete\""),
        ];
        for (stage, expected) in names {
            assert_eq!(serde_json::to_string(&stage).unwrap(), expected);
        }
    }
}
