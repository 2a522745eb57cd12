//! Observability setup for beacon: structured logging and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
