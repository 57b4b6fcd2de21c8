//! The measure-and-close path shared by every instrumented operation.
//!
//! An [`OperationGuard`] is created when an operation starts. Exactly one of
//! [`OperationGuard::succeed`], [`OperationGuard::fail`] or `Drop` finishes it;
//! finishing annotates the span, emits the metrics and closes the span, in that
//! order. `Drop` covers cancellation: a future dropped mid-flight is recorded as
//! a failed request and its span is closed with an error status.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Span, debug, error, warn};

use super::keys::*;
use super::metrics::MetricsRecorder;
use super::span::{OperationSpan, SpanFactory};
use super::types::{Operation, Outcome, ResponseSummary};

/// Error text recorded when an operation is abandoned before it finished.
pub const CANCELLED_MESSAGE: &str = "operation cancelled";
/// Error text recorded when the operation's task panicked mid-flight.
pub const PANICKED_MESSAGE: &str = "operation panicked";

/// Run instrumentation code, turning a panic into a logged no-op.
fn contain<T>(stage: &'static str, f: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => Some(v),
        Err(_) => {
            error!(stage, "instrumentation panicked; operation result is unaffected");
            None
        }
    }
}

pub struct OperationGuard {
    op: Operation,
    model: String,
    started: Instant,
    span: Option<OperationSpan>,
    metrics: Arc<dyn MetricsRecorder>,
    finished: bool,
}

impl OperationGuard {
    pub fn start(
        factory: &SpanFactory,
        metrics: Arc<dyn MetricsRecorder>,
        op: Operation,
        model: &str,
        payload: &str,
        config: Option<&str>,
    ) -> Self {
        let started = Instant::now();
        let span = contain("open span", || factory.open(op, model, payload, config));
        Self {
            op,
            model: model.to_string(),
            started,
            span,
            metrics,
            finished: false,
        }
    }

    /// Handle to the operation's span, or a disabled span if opening it failed.
    pub fn span(&self) -> Span {
        self.span
            .as_ref()
            .map_or_else(Span::none, |s| s.span().clone())
    }

    pub fn succeed(mut self, summary: ResponseSummary, total_tokens: Option<u64>) {
        self.finish(Outcome::Ok {
            summary,
            total_tokens,
        });
    }

    pub fn fail(mut self, message: impl Into<String>) {
        self.finish(Outcome::Failed {
            message: message.into(),
        });
    }

    fn finish(&mut self, outcome: Outcome) {
        if self.finished {
            return;
        }
        self.finished = true;
        let elapsed = self.started.elapsed().as_secs_f64();

        if let Some(span) = self.span.as_mut() {
            annotate(span, &outcome);
        }

        emit_metrics(self.metrics.as_ref(), self.op, &self.model, elapsed, &outcome);

        debug!(
            operation = %self.op,
            model = %self.model,
            elapsed_ms = elapsed * 1000.0,
            error = outcome.error_message(),
            "gen_ai operation finished"
        );

        if let Some(span) = self.span.take() {
            contain("close span", || span.close());
        }
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if !self.finished {
            let message = if std::thread::panicking() {
                PANICKED_MESSAGE
            } else {
                CANCELLED_MESSAGE
            };
            warn!(operation = %self.op, model = %self.model, reason = message, "gen_ai operation dropped before completion");
            self.finish(Outcome::Failed {
                message: message.to_string(),
            });
        }
    }
}

/// Status is recorded first; each attribute record is contained on its own.
fn annotate(span: &mut OperationSpan, outcome: &Outcome) {
    match outcome {
        Outcome::Ok {
            summary,
            total_tokens,
        } => {
            contain("set span status", || span.set_ok());
            if let Some(tokens) = total_tokens {
                contain("record token count", || span.record_token_count(*tokens));
            }
            match summary {
                ResponseSummary::Text(text) => {
                    contain("record response", || span.record_response_text(text));
                }
                ResponseSummary::Embedding { dimensions } => {
                    contain("record dimensions", || {
                        span.record_embedding_dimensions(*dimensions);
                    });
                }
            }
        }
        Outcome::Failed { message } => {
            contain("set span status", || span.set_error(message));
        }
    }
}

/// Emit the per-operation metric set. Each emission is contained on its own so
/// a failing instrument cannot suppress the others.
pub(crate) fn emit_metrics(
    metrics: &dyn MetricsRecorder,
    op: Operation,
    model: &str,
    elapsed_secs: f64,
    outcome: &Outcome,
) {
    let attributes = [
        KeyValue::new(KEY_OPERATION_NAME, op.name()),
        KeyValue::new(KEY_MODEL, model.to_string()),
    ];

    contain("record duration", || metrics.record_duration(elapsed_secs, &attributes));
    contain("record latency", || {
        metrics.record_latency(elapsed_secs * 1000.0, &attributes);
    });
    contain("add request", || metrics.add_request(&attributes));

    if let Some(tokens) = outcome.total_tokens() {
        let mut tagged = attributes.to_vec();
        tagged.push(KeyValue::new(KEY_TOKEN_TYPE, TOKEN_TYPE_TOTAL));
        contain("record token usage", || metrics.record_token_usage(tokens, &tagged));
    }

    if let Some(message) = outcome.error_message() {
        let mut tagged = attributes.to_vec();
        tagged.push(KeyValue::new(KEY_ERROR, message.to_string()));
        contain("add error", || metrics.add_error(&tagged));
    }
}
