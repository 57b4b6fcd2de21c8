//! Streaming primitives exposed by gentrace.
//!
//! Contract for an instrumented stream:
//! - Chunks are forwarded unchanged, in order.
//! - A backend error item is forwarded unchanged and ends the stream.
//! - After the last chunk the operation is finished (token count, span status,
//!   metrics) before the stream reports its end.
//! - Dropping the stream early finishes the operation as cancelled.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tracing::{Instrument, Span};

use crate::backend::GenAiBackend;
use crate::client::count_tokens_best_effort;
use crate::error::CoreResult;
use crate::model::GenerateChunk;
use crate::telemetry::{OperationGuard, ResponseSummary};

/// Boxed stream of generated chunks. Backends that support streaming return this.
pub type ChunkStream = BoxStream<'static, CoreResult<GenerateChunk>>;

struct Live {
    inner: ChunkStream,
    guard: OperationGuard,
    span: Span,
    backend: Arc<dyn GenAiBackend>,
    model: String,
    prompt: String,
    text: String,
}

/// Wrap `inner` so that `guard` is finished exactly once when the stream ends,
/// fails, or is dropped.
pub(crate) fn instrument_stream(
    inner: ChunkStream,
    guard: OperationGuard,
    backend: Arc<dyn GenAiBackend>,
    model: String,
    prompt: String,
) -> ChunkStream {
    let span = guard.span();
    let live = Live {
        inner,
        guard,
        span,
        backend,
        model,
        prompt,
        text: String::new(),
    };

    Box::pin(stream::unfold(Some(live), |state| async move {
        let mut live = state?;
        match live.inner.next().instrument(live.span.clone()).await {
            Some(Ok(chunk)) => {
                live.text.push_str(&chunk.text);
                Some((Ok(chunk), Some(live)))
            }
            Some(Err(err)) => {
                live.guard.fail(err.to_string());
                Some((Err(err), None))
            }
            None => {
                let Live {
                    guard,
                    span,
                    backend,
                    model,
                    prompt,
                    text,
                    ..
                } = live;
                let counted = count_tokens_best_effort(
                    backend.as_ref(),
                    &model,
                    &format!("{prompt}{text}"),
                )
                .instrument(span)
                .await;
                guard.succeed(
                    ResponseSummary::Text(text),
                    counted.map(|t| t.total_tokens),
                );
                None
            }
        }
    }))
}
