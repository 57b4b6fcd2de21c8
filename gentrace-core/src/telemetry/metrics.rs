use std::sync::Arc;

use once_cell::sync::OnceCell;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, Meter},
};
use tracing::info;

use super::keys::*;

/// Receives the metric emissions of instrumented operations.
///
/// Requirements:
/// - Implementations must be thread-safe (`Send + Sync`) and `'static`.
/// - Every method may be called concurrently from many in-flight operations.
/// - Panics are contained by the caller, but implementations should not rely on that.
pub trait MetricsRecorder: Send + Sync + 'static {
    /// `gen_ai.client.operation.duration`, seconds.
    fn record_duration(&self, seconds: f64, attributes: &[KeyValue]);
    /// `gen_ai.client.latency`, milliseconds.
    fn record_latency(&self, millis: f64, attributes: &[KeyValue]);
    /// `gen_ai.client.requests`, +1.
    fn add_request(&self, attributes: &[KeyValue]);
    /// `gen_ai.client.token.usage`, total tokens.
    fn record_token_usage(&self, tokens: u64, attributes: &[KeyValue]);
    /// `gen_ai.client.errors`, +1.
    fn add_error(&self, attributes: &[KeyValue]);
}

/// The five OpenTelemetry instruments backing [`MetricsRecorder`].
#[derive(Clone)]
pub struct GenAiInstruments {
    operation_duration: Histogram<f64>,
    token_usage: Histogram<u64>,
    requests: Counter<u64>,
    errors: Counter<u64>,
    latency: Histogram<f64>,
}

impl GenAiInstruments {
    /// Build the instruments from `meter`. Performs no I/O.
    pub fn new(meter: &Meter) -> Self {
        let operation_duration = meter
            .f64_histogram(METRIC_OPERATION_DURATION)
            .with_description("Duration of GenAI operations")
            .with_unit("s")
            .build();

        let token_usage = meter
            .u64_histogram(METRIC_TOKEN_USAGE)
            .with_description("Number of tokens used in GenAI operations")
            .with_unit("{token}")
            .build();

        let requests = meter
            .u64_counter(METRIC_REQUESTS)
            .with_description("Number of GenAI API requests")
            .with_unit("1")
            .build();

        let errors = meter
            .u64_counter(METRIC_ERRORS)
            .with_description("Number of GenAI API errors")
            .with_unit("1")
            .build();

        let latency = meter
            .f64_histogram(METRIC_LATENCY)
            .with_description("Latency of GenAI API requests")
            .with_unit("ms")
            .build();

        Self {
            operation_duration,
            token_usage,
            requests,
            errors,
            latency,
        }
    }
}

impl MetricsRecorder for GenAiInstruments {
    fn record_duration(&self, seconds: f64, attributes: &[KeyValue]) {
        self.operation_duration.record(seconds, attributes);
    }

    fn record_latency(&self, millis: f64, attributes: &[KeyValue]) {
        self.latency.record(millis, attributes);
    }

    fn add_request(&self, attributes: &[KeyValue]) {
        self.requests.add(1, attributes);
    }

    fn record_token_usage(&self, tokens: u64, attributes: &[KeyValue]) {
        self.token_usage.record(tokens, attributes);
    }

    fn add_error(&self, attributes: &[KeyValue]) {
        self.errors.add(1, attributes);
    }
}

static INSTRUMENTS: OnceCell<Arc<GenAiInstruments>> = OnceCell::new();

/// Initialize the process-wide instruments from the global meter provider.
///
/// Idempotent: the first call builds the instruments, later calls return the
/// same handles. Call it after the global meter provider is installed, since
/// instruments built against the no-op provider stay no-op.
pub fn init_instruments() -> Arc<GenAiInstruments> {
    INSTRUMENTS
        .get_or_init(|| {
            let meter = global::meter(INSTRUMENTATION_SCOPE);
            info!("GenAI metric instruments initialized");
            Arc::new(GenAiInstruments::new(&meter))
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::SdkMeterProvider;

    #[test]
    fn instruments_record_without_exporter() {
        let provider = SdkMeterProvider::builder().build();
        let inst = GenAiInstruments::new(&provider.meter("test"));
        let attrs = [KeyValue::new(KEY_OPERATION_NAME, "generate")];
        inst.record_duration(0.25, &attrs);
        inst.record_latency(250.0, &attrs);
        inst.add_request(&attrs);
        inst.record_token_usage(7, &attrs);
        inst.add_error(&attrs);
    }

    #[test]
    fn init_is_idempotent() {
        let a = init_instruments();
        let b = init_instruments();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
