use async_trait::async_trait;
use futures::stream;

use crate::error::CoreResult;
use crate::model::{
    EmbedRequest, GenerateChunk, GenerateRequest, GenerateResponse, TokenCount,
};
use crate::stream::ChunkStream;

/// The generative-AI capability set the instrumented client delegates to.
///
/// Implementations are shared across concurrent calls behind an `Arc` and must
/// not rely on per-call mutable state.
#[async_trait]
pub trait GenAiBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, req: GenerateRequest) -> CoreResult<GenerateResponse>;

    // streaming is optional
    async fn generate_stream(&self, req: GenerateRequest) -> CoreResult<ChunkStream> {
        // default: call generate once and yield it as a single chunk
        let single = self.generate(req).await?;
        Ok(Box::pin(stream::iter(vec![Ok(GenerateChunk {
            text: single.text,
        })])))
    }

    async fn embed(&self, req: EmbedRequest) -> CoreResult<Vec<f32>>;

    async fn count_tokens(&self, model: &str, text: &str) -> CoreResult<TokenCount>;
}

/// Offline backend that echoes the prompt back.
/// Useful for demos and smoke tests without a credential.
pub struct NullBackend;

const NULL_DIMENSIONS: usize = 8;

#[async_trait]
impl GenAiBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    async fn generate(&self, req: GenerateRequest) -> CoreResult<GenerateResponse> {
        Ok(GenerateResponse::text(format!("[null] {}", req.prompt)))
    }

    async fn embed(&self, req: EmbedRequest) -> CoreResult<Vec<f32>> {
        let dims = req
            .config
            .output_dimensionality
            .map_or(NULL_DIMENSIONS, |d| d as usize);
        Ok(vec![0.0_f32; dims])
    }

    async fn count_tokens(&self, _model: &str, text: &str) -> CoreResult<TokenCount> {
        let words = text.split_whitespace().count() as u64;
        Ok(TokenCount {
            total_tokens: words,
            prompt_tokens: words,
            completion_tokens: 0,
        })
    }
}
