//! Process-wide telemetry bootstrap.
//!
//! Builds the OpenTelemetry tracer and meter providers for the configured
//! exporter, installs the global meter provider, initializes the GenAI
//! instruments and installs the `tracing` subscriber (env filter, fmt layer and
//! the `tracing-opentelemetry` bridge).
//!
//! The stdout exporter is the default so spans and metrics are observable
//! without a collector. OTLP/HTTP is used when `exporter = "otlp"`.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use super::keys::{INSTRUMENTATION_SCOPE, OPERATION_SPAN_TARGET};
use super::metrics::{GenAiInstruments, init_instruments};
use crate::config::{ExporterKind, TelemetryCfg};
use crate::error::{CoreResult, GenAiError};

/// Live providers. Keep a handle until exit and call [`TelemetryProviders::shutdown`]
/// to flush pending spans and metrics.
#[derive(Clone)]
pub struct TelemetryProviders {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

static PROVIDERS: OnceCell<TelemetryProviders> = OnceCell::new();

/// Initialize telemetry once per process. Later calls return the providers
/// built by the first call and ignore `cfg`.
pub fn init_telemetry(cfg: &TelemetryCfg) -> CoreResult<(TelemetryProviders, Arc<GenAiInstruments>)> {
    let providers = PROVIDERS
        .get_or_try_init(|| {
            let providers = build_providers(cfg)?;

            if let Some(mp) = &providers.meter_provider {
                global::set_meter_provider(mp.clone());
            } else {
                warn!("No meter provider available, metrics will not be exported");
            }

            install_subscriber(cfg, providers.tracer_provider.as_ref());
            info!(
                service = %cfg.service_name,
                exporter = ?cfg.exporter,
                "Telemetry initialized"
            );
            Ok::<_, GenAiError>(providers)
        })?
        .clone();

    // Instruments must be built after the global meter provider is set.
    Ok((providers, init_instruments()))
}

/// Build providers for `cfg` without touching any global state.
pub fn build_providers(cfg: &TelemetryCfg) -> CoreResult<TelemetryProviders> {
    let resource = Resource::builder()
        .with_service_name(cfg.service_name.clone())
        .build();
    let interval = Duration::from_millis(cfg.metric_export_interval_ms);

    let providers = match cfg.exporter {
        ExporterKind::None => TelemetryProviders {
            tracer_provider: None,
            meter_provider: None,
        },
        ExporterKind::Console => {
            let tracer_provider = SdkTracerProvider::builder()
                .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
                .with_resource(resource.clone())
                .build();
            let reader = PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
                .with_interval(interval)
                .build();
            let meter_provider = SdkMeterProvider::builder()
                .with_reader(reader)
                .with_resource(resource)
                .build();
            TelemetryProviders {
                tracer_provider: Some(tracer_provider),
                meter_provider: Some(meter_provider),
            }
        }
        ExporterKind::Otlp => {
            let base = cfg.otlp_endpoint.trim_end_matches('/');
            let span_exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(format!("{base}/v1/traces"))
                .build()
                .map_err(|e| GenAiError::Telemetry(format!("otlp span exporter: {e}")))?;
            let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_http()
                .with_endpoint(format!("{base}/v1/metrics"))
                .build()
                .map_err(|e| GenAiError::Telemetry(format!("otlp metric exporter: {e}")))?;

            let tracer_provider = SdkTracerProvider::builder()
                .with_batch_exporter(span_exporter)
                .with_resource(resource.clone())
                .build();
            let reader = PeriodicReader::builder(metric_exporter)
                .with_interval(interval)
                .build();
            let meter_provider = SdkMeterProvider::builder()
                .with_reader(reader)
                .with_resource(resource)
                .build();
            TelemetryProviders {
                tracer_provider: Some(tracer_provider),
                meter_provider: Some(meter_provider),
            }
        }
    };
    Ok(providers)
}

fn install_subscriber(cfg: &TelemetryCfg, tracer_provider: Option<&SdkTracerProvider>) {
    let directives =
        std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| cfg.log_filter.clone());
    let env_filter = operation_filter(&directives);
    let otel_layer = tracer_provider
        .map(|tp| tracing_opentelemetry::layer().with_tracer(tp.tracer(INSTRUMENTATION_SCOPE)));

    // An application may already own the global subscriber; spans still reach
    // it, only the OpenTelemetry bridge is missing then.
    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(otel_layer)
        .try_init()
    {
        warn!("tracing subscriber already installed: {e}");
    }
}

/// Build the env filter for `directives`, keeping operation spans enabled at
/// `info` unless the directives mention their target.
fn operation_filter(directives: &str) -> EnvFilter {
    let filter = EnvFilter::new(directives);
    if directives.contains(OPERATION_SPAN_TARGET) {
        return filter;
    }
    match format!("{OPERATION_SPAN_TARGET}=info").parse::<Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

impl TelemetryProviders {
    pub const fn has_exporter(&self) -> bool {
        self.tracer_provider.is_some() || self.meter_provider.is_some()
    }

    /// Flush and shut down both providers. Errors are logged, not returned.
    pub fn shutdown(&self) {
        if let Some(tp) = &self.tracer_provider
            && let Err(e) = tp.shutdown()
        {
            error!("Failed to shutdown tracer provider: {e}");
        }
        if let Some(mp) = &self.meter_provider
            && let Err(e) = mp.shutdown()
        {
            error!("Failed to shutdown meter provider: {e}");
        }
    }
}
