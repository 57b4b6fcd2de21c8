/// Span/metric attribute keys for instrumented operations.
/// Keep these stable; changing them is a breaking change for dashboards.
pub const KEY_OPERATION_NAME: &str = "gen_ai.operation.name";
pub const KEY_MODEL: &str = "gen_ai.model";
pub const KEY_PROMPT: &str = "gen_ai.prompt";
pub const KEY_CONTENT: &str = "gen_ai.content";
pub const KEY_CONFIG: &str = "gen_ai.config";

pub const KEY_RESPONSE: &str = "gen_ai.response";
pub const KEY_TOKEN_COUNT: &str = "gen_ai.token_count";
pub const KEY_EMBEDDING_DIMENSIONS: &str = "gen_ai.embedding.dimensions";
pub const KEY_TOKEN_TYPE: &str = "gen_ai.token.type";
pub const KEY_ERROR: &str = "gen_ai.error";

/// Understood by `tracing-opentelemetry` when exporting spans.
pub const KEY_OTEL_KIND: &str = "otel.kind";
pub const KEY_OTEL_STATUS_CODE: &str = "otel.status_code";
pub const KEY_OTEL_STATUS_MESSAGE: &str = "otel.status_message";

pub const TOKEN_TYPE_TOTAL: &str = "total";

/// `tracing` target of operation spans. The subscriber keeps it enabled at
/// `info` unless the filter names it explicitly.
pub const OPERATION_SPAN_TARGET: &str = "gen_ai";

/// Instrumentation scope for the meter and tracer.
pub const INSTRUMENTATION_SCOPE: &str = "genai-instrumentation";

pub const METRIC_OPERATION_DURATION: &str = "gen_ai.client.operation.duration";
pub const METRIC_TOKEN_USAGE: &str = "gen_ai.client.token.usage";
pub const METRIC_REQUESTS: &str = "gen_ai.client.requests";
pub const METRIC_ERRORS: &str = "gen_ai.client.errors";
pub const METRIC_LATENCY: &str = "gen_ai.client.latency";
