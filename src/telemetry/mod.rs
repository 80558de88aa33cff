//! Telemetry and observability for the limiter.
//!
//! The limiter emits structured events that describe each decision and the
//! health of the shared counter store. Events flow through `TelemetrySink`
//! implementations which can log, aggregate, or forward them to external
//! systems (see the `tierguard-prometheus` companion crate).
//!
//! # Event Types
//!
//! - **Decision**: `Allowed`, `Denied`
//! - **Store**: `Unavailable`, `Degraded`, `Recovered`
//!
//! # Telemetry Sinks
//!
//! The `TelemetrySink` trait defines how events are consumed. It's implemented
//! as a `tower::Service<LimitEvent>` for composability.

pub mod events;
pub mod sinks;

pub use events::{DecisionEvent, LimitEvent, StoreEvent};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};
