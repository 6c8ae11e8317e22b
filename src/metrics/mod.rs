//! Observability for the orchestration engine.
//!
//! Components emit `EngineEvent`s into an `EventSink`; `MetricsAggregator` is the
//! sink that turns them into counters for `snapshot()`.

mod aggregator;
mod events;

pub use aggregator::{MetricsAggregator, MetricsSnapshot, ProviderHealth};
pub use events::{CallResult, EngineEvent, EventSink, FanoutSink, NoopSink, RecordingSink};
