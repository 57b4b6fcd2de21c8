//! Per-operation trace spans.
//!
//! Spans are plain `tracing` spans carrying the OpenTelemetry conventions
//! understood by `tracing-opentelemetry` (`otel.kind`, `otel.status_code`,
//! `otel.status_message`). Without a subscriber installed they are disabled and
//! every operation on them is a no-op.

use tracing::field::Empty;
use tracing::{Span, warn};

use super::keys::*;
use super::types::Operation;
use crate::text::truncate;

/// Default cap on payload and response attributes, in chars.
pub const DEFAULT_MAX_PAYLOAD_CHARS: usize = 2048;

macro_rules! operation_span {
    ($name:literal, $payload_key:literal, $op:expr, $model:expr, $payload:expr) => {
        tracing::info_span!(
            target: OPERATION_SPAN_TARGET,
            $name,
            "otel.kind" = "client",
            "gen_ai.operation.name" = $op,
            "gen_ai.model" = $model,
            $payload_key = $payload,
            "gen_ai.config" = Empty,
            "gen_ai.response" = Empty,
            "gen_ai.token_count" = Empty,
            "gen_ai.embedding.dimensions" = Empty,
            "gen_ai.error" = Empty,
            "otel.status_code" = Empty,
            "otel.status_message" = Empty,
        )
    };
}

/// Opens one span per logical operation. Never fails.
#[derive(Debug, Clone, Copy)]
pub struct SpanFactory {
    max_payload_chars: usize,
}

impl Default for SpanFactory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_CHARS)
    }
}

impl SpanFactory {
    pub const fn new(max_payload_chars: usize) -> Self {
        Self { max_payload_chars }
    }

    /// Open `gen_ai.<operation>` with kind CLIENT and the initial attributes.
    /// `config` is the already-serialized request configuration, if any.
    ///
    /// The returned span is not closed by the factory.
    pub fn open(
        &self,
        op: Operation,
        model: &str,
        payload: &str,
        config: Option<&str>,
    ) -> OperationSpan {
        let payload = truncate(payload, self.max_payload_chars);
        let payload = payload.as_ref();
        let span = match op {
            Operation::Generate => operation_span!(
                "gen_ai.generate_content",
                "gen_ai.prompt",
                op.name(),
                model,
                payload
            ),
            Operation::GenerateStream => operation_span!(
                "gen_ai.generate_content_stream",
                "gen_ai.prompt",
                op.name(),
                model,
                payload
            ),
            Operation::Embed => operation_span!(
                "gen_ai.embed_content",
                "gen_ai.content",
                op.name(),
                model,
                payload
            ),
        };
        if let Some(config) = config {
            span.record(KEY_CONFIG, config);
        }
        OperationSpan {
            span,
            status_set: false,
            max_payload_chars: self.max_payload_chars,
        }
    }
}

/// A span owned by exactly one operation.
///
/// Closing happens when the value is dropped (or via [`OperationSpan::close`]),
/// so it can only happen once. A span dropped before a status was set is
/// marked ERROR.
#[derive(Debug)]
pub struct OperationSpan {
    span: Span,
    status_set: bool,
    max_payload_chars: usize,
}

impl OperationSpan {
    /// The underlying span, for instrumenting the backend future.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn record_response_text(&self, text: &str) {
        let text = truncate(text, self.max_payload_chars);
        self.span.record(KEY_RESPONSE, text.as_ref());
    }

    pub fn record_embedding_dimensions(&self, dimensions: usize) {
        self.span.record(KEY_EMBEDDING_DIMENSIONS, dimensions as u64);
    }

    pub fn record_token_count(&self, total_tokens: u64) {
        self.span.record(KEY_TOKEN_COUNT, total_tokens);
    }

    pub fn set_ok(&mut self) {
        self.status_set = true;
        self.span.record(KEY_OTEL_STATUS_CODE, "OK");
    }

    pub fn set_error(&mut self, message: &str) {
        self.status_set = true;
        self.span.record(KEY_OTEL_STATUS_CODE, "ERROR");
        self.span.record(KEY_OTEL_STATUS_MESSAGE, message);
        self.span.record(KEY_ERROR, message);
    }

    pub const fn has_status(&self) -> bool {
        self.status_set
    }

    /// Close the span.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for OperationSpan {
    fn drop(&mut self) {
        if !self.status_set {
            warn!(span = ?self.span.metadata().map(|m| m.name()), "span closed without status");
            self.set_error("span closed without status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::test_span::install_capture;

    #[test]
    fn open_records_initial_attributes() {
        let (store, _guard) = install_capture();
        let factory = SpanFactory::default();
        let mut span = factory.open(
            Operation::Generate,
            "test-model",
            "Hello",
            Some(r#"{"temperature":0.5}"#),
        );
        span.set_ok();
        span.close();

        let data = store.only("gen_ai.generate_content");
        assert_eq!(data.field("gen_ai.operation.name").as_deref(), Some("\"generate\""));
        assert_eq!(data.field("gen_ai.model").as_deref(), Some("\"test-model\""));
        assert_eq!(data.field("gen_ai.prompt").as_deref(), Some("\"Hello\""));
        assert_eq!(data.field(KEY_OTEL_KIND).as_deref(), Some("\"client\""));
        assert_eq!(
            data.field("gen_ai.config").as_deref(),
            Some(r#""{"temperature":0.5}""#)
        );
        assert_eq!(data.field("otel.status_code").as_deref(), Some("\"OK\""));
        assert_eq!(data.closed(), 1);
    }

    #[test]
    fn embed_uses_content_attribute_and_truncates() {
        let (store, _guard) = install_capture();
        let factory = SpanFactory::new(4);
        let mut span = factory.open(Operation::Embed, "e", "abcdefgh", None);
        span.record_embedding_dimensions(768);
        span.set_ok();
        drop(span);

        let data = store.only("gen_ai.embed_content");
        assert_eq!(data.field("gen_ai.content").as_deref(), Some("\"abcd...\""));
        assert_eq!(data.field("gen_ai.embedding.dimensions").as_deref(), Some("768"));
        assert!(data.field("gen_ai.config").is_none());
    }

    #[test]
    fn dropping_without_status_marks_error() {
        let (store, _guard) = install_capture();
        let span = SpanFactory::default().open(Operation::Generate, "m", "p", None);
        assert!(!span.has_status());
        drop(span);

        let data = store.only("gen_ai.generate_content");
        assert_eq!(data.field("otel.status_code").as_deref(), Some("\"ERROR\""));
        assert_eq!(
            data.field("gen_ai.error").as_deref(),
            Some("\"span closed without status\"")
        );
        assert_eq!(data.closed(), 1);
    }

    #[test]
    fn span_names_and_payload_keys_match_operation() {
        let (store, _guard) = install_capture();
        for op in [Operation::Generate, Operation::GenerateStream, Operation::Embed] {
            let mut span = SpanFactory::default().open(op, "m", "payload", None);
            span.set_ok();
            span.close();

            let data = store.only(op.span_name());
            assert_eq!(data.field(op.payload_key()).as_deref(), Some("\"payload\""));
            assert_eq!(
                data.field(KEY_OPERATION_NAME),
                Some(format!("\"{}\"", op.name()))
            );
        }
    }

    #[test]
    fn open_without_subscriber_is_noop() {
        let mut span = SpanFactory::default().open(Operation::Embed, "e", "c", None);
        span.record_token_count(3);
        span.set_ok();
        span.close();
    }
}
