//! Observability subsystem for logdoc
//!
//! - Structured logging (JSON lines emitted through `tracing`)
//! - Per-table counters
//! - Lifecycle events and begin/complete scopes
//!
//! Observability is read-only: nothing here changes table behavior.
//!
//! # Usage
//!
//! ```ignore
//! use logdoc::observability::{log_event, Event, ObservationScope};
//!
//! log_event(Event::IndexCreated, &[("table", "users"), ("field", "age")]);
//!
//! let scope = ObservationScope::new("COMPACTION");
//! // ... do work ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, TableMetrics};
pub use scope::ObservationScope;

/// Log a lifecycle event with fields at the event's severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
