//! Observability setup for flho: tracing subscriber and optional
//! OpenTelemetry bridge.

pub mod tracing_setup;
