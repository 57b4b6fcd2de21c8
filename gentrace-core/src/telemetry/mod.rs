//! Tracing and metrics for generative-AI operations.
//!
//! - [`metrics`]: the five `gen_ai.client.*` instruments behind [`MetricsRecorder`].
//! - [`span`]: one `tracing` span per operation, exported through `tracing-opentelemetry`.
//! - [`operation`]: the guard that emits metrics and closes the span exactly once.
//! - [`init`]: provider/exporter bootstrap for binaries.

pub mod init;
pub mod keys;
pub mod memory;
pub mod metrics;
pub mod operation;
pub mod span;
pub mod types;
#[cfg(test)]
pub mod test_span;

pub use init::{TelemetryProviders, build_providers, init_telemetry};
pub use keys::*;
pub use memory::{Emission, InMemoryRecorder, Instrument};
pub use metrics::{GenAiInstruments, MetricsRecorder, init_instruments};
pub use operation::{CANCELLED_MESSAGE, OperationGuard, PANICKED_MESSAGE};
pub use span::{DEFAULT_MAX_PAYLOAD_CHARS, OperationSpan, SpanFactory};
pub use types::*;
