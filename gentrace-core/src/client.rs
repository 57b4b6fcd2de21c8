//! The instrumented client: every call is wrapped in one span and one set of
//! metric emissions, while results and errors pass through untouched.

use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, debug, warn};

use crate::backend::GenAiBackend;
use crate::backend_factory::{BackendKind, build_backend};
use crate::config::{Config, ModelDefaults};
use crate::error::CoreResult;
use crate::model::{
    EmbedConfig, EmbedRequest, GenerateConfig, GenerateRequest, GenerateResponse, TokenCount,
};
use crate::stream::{ChunkStream, instrument_stream};
use crate::telemetry::{MetricsRecorder, Operation, OperationGuard, ResponseSummary, SpanFactory};

/// Wraps a [`GenAiBackend`] so that each operation is traced and measured.
///
/// Cheap to share: clone the `Arc`s, or put the client itself behind one.
/// Concurrent calls never share per-call state.
pub struct InstrumentedClient {
    backend: Arc<dyn GenAiBackend>,
    metrics: Arc<dyn MetricsRecorder>,
    spans: SpanFactory,
    defaults: ModelDefaults,
}

impl InstrumentedClient {
    pub fn new(backend: Arc<dyn GenAiBackend>, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            backend,
            metrics,
            spans: SpanFactory::default(),
            defaults: ModelDefaults::default(),
        }
    }

    /// Build a Gemini-backed client from configuration.
    ///
    /// Fails with [`crate::error::GenAiError::MissingCredential`] when the
    /// configured API key variable is unset or empty.
    pub fn from_config(cfg: &Config, metrics: Arc<dyn MetricsRecorder>) -> CoreResult<Self> {
        Self::from_config_with(BackendKind::Gemini, cfg, metrics)
    }

    pub fn from_config_with(
        kind: BackendKind,
        cfg: &Config,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> CoreResult<Self> {
        let backend = build_backend(kind, cfg)?;
        Ok(Self::new(backend, metrics)
            .with_defaults(cfg.models.clone())
            .with_span_factory(SpanFactory::new(cfg.telemetry.max_payload_chars)))
    }

    pub fn with_defaults(mut self, defaults: ModelDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_span_factory(mut self, spans: SpanFactory) -> Self {
        self.spans = spans;
        self
    }

    /// Generate content for `prompt`.
    ///
    /// On success the prompt's token count is recorded as token usage; a
    /// failing count is logged and skipped. On failure the backend's error is
    /// returned as-is after being recorded.
    pub async fn generate_content(
        &self,
        prompt: &str,
        model: Option<&str>,
        config: Option<GenerateConfig>,
    ) -> CoreResult<GenerateResponse> {
        let model = model.unwrap_or(&self.defaults.generate).to_string();
        let config_json = config.as_ref().and_then(serialize_config);
        let guard = OperationGuard::start(
            &self.spans,
            self.metrics.clone(),
            Operation::Generate,
            &model,
            prompt,
            config_json.as_deref(),
        );
        let span = guard.span();

        let req = GenerateRequest {
            model: model.clone(),
            prompt: prompt.to_string(),
            config: config.unwrap_or_default(),
        };

        match self.backend.generate(req).instrument(span.clone()).await {
            Ok(resp) => {
                let counted = count_tokens_best_effort(self.backend.as_ref(), &model, prompt)
                    .instrument(span)
                    .await;
                guard.succeed(
                    ResponseSummary::Text(resp.text.clone()),
                    counted.map(|t| t.total_tokens),
                );
                Ok(resp)
            }
            Err(err) => {
                debug!(model = %model, error = %err, "generate failed");
                guard.fail(err.to_string());
                Err(err)
            }
        }
    }

    /// Embed `content`, returning the raw vector.
    pub async fn embed_content(
        &self,
        content: &str,
        model: Option<&str>,
        config: Option<EmbedConfig>,
    ) -> CoreResult<Vec<f32>> {
        let model = model.unwrap_or(&self.defaults.embed).to_string();
        let config_json = config.as_ref().and_then(serialize_config);
        let guard = OperationGuard::start(
            &self.spans,
            self.metrics.clone(),
            Operation::Embed,
            &model,
            content,
            config_json.as_deref(),
        );
        let span = guard.span();

        let req = EmbedRequest {
            model: model.clone(),
            content: content.to_string(),
            config: config.unwrap_or_default(),
        };

        match self.backend.embed(req).instrument(span.clone()).await {
            Ok(values) => {
                let counted = count_tokens_best_effort(self.backend.as_ref(), &model, content)
                    .instrument(span)
                    .await;
                guard.succeed(
                    ResponseSummary::Embedding {
                        dimensions: values.len(),
                    },
                    counted.map(|t| t.total_tokens),
                );
                Ok(values)
            }
            Err(err) => {
                debug!(model = %model, error = %err, "embed failed");
                guard.fail(err.to_string());
                Err(err)
            }
        }
    }

    /// Stream generated content for `prompt`.
    ///
    /// The operation stays open while the returned stream is consumed. It is
    /// finished when the stream ends, yields an error, or is dropped. Token
    /// usage counts the prompt plus the full streamed response.
    pub async fn generate_content_stream(
        &self,
        prompt: &str,
        model: Option<&str>,
        config: Option<GenerateConfig>,
    ) -> CoreResult<ChunkStream> {
        let model = model.unwrap_or(&self.defaults.generate).to_string();
        let config_json = config.as_ref().and_then(serialize_config);
        let guard = OperationGuard::start(
            &self.spans,
            self.metrics.clone(),
            Operation::GenerateStream,
            &model,
            prompt,
            config_json.as_deref(),
        );
        let span = guard.span();

        let req = GenerateRequest {
            model: model.clone(),
            prompt: prompt.to_string(),
            config: config.unwrap_or_default(),
        };

        match self.backend.generate_stream(req).instrument(span).await {
            Ok(inner) => Ok(instrument_stream(
                inner,
                guard,
                self.backend.clone(),
                model,
                prompt.to_string(),
            )),
            Err(err) => {
                debug!(model = %model, error = %err, "generate stream failed to open");
                guard.fail(err.to_string());
                Err(err)
            }
        }
    }
}

fn serialize_config<T: Serialize>(config: &T) -> Option<String> {
    match serde_json::to_string(config) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(error = %e, "could not serialize request config for span");
            None
        }
    }
}

/// Count tokens, logging and swallowing any failure.
pub(crate) async fn count_tokens_best_effort(
    backend: &dyn GenAiBackend,
    model: &str,
    text: &str,
) -> Option<TokenCount> {
    match backend.count_tokens(model, text).await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!(model = %model, error = %e, "token count failed; token usage not recorded");
            None
        }
    }
}
