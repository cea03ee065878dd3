//! Lifecycle events.
//!
//! The stage executor and the orchestrator report progress as named events
//! (`stage.started`, `orchestrator.state`, `health.round`, ...) to an
//! [`EventSink`]. Sinks never fail the caller.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, StackupEvent};
