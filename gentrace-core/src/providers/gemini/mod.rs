use async_trait::async_trait;
use futures::StreamExt;
use futures::future;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::backend::GenAiBackend;
use crate::error::{CoreResult, GenAiError};
use crate::http_client::HttpClient;
use crate::model::{
    EmbedRequest, GenerateChunk, GenerateConfig, GenerateRequest, GenerateResponse,
    SafetyRating, TokenCount,
};
use crate::stream::ChunkStream;

const API_VERSION: &str = "v1beta";

/// Generative Language REST API adapter.
#[derive(Debug, Clone)]
pub struct Gemini {
    http: HttpClient,
    api_key: SecretString,
    base: String,
    name: String,
}

impl Gemini {
    /// Fails with `MissingCredential` when the key is empty.
    pub fn new(http: HttpClient, api_key: SecretString, base: String) -> CoreResult<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(GenAiError::MissingCredential("API key is empty".into()));
        }
        Ok(Self {
            http,
            api_key,
            base: base.trim_end_matches('/').to_string(),
            name: "gemini".into(),
        })
    }

    fn url(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/{API_VERSION}/models/{model}:{method}", self.base)
    }

    fn headers(&self) -> [(&str, &str); 1] {
        [("x-goog-api-key", self.api_key.expose_secret())]
    }

    fn malformed(&self, message: impl Into<String>) -> GenAiError {
        GenAiError::MalformedResponse {
            provider: self.name.clone(),
            message: message.into(),
        }
    }
}

// ===== Gemini wire types =====

#[derive(Serialize)]
struct GContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: [GPart<'a>; 1],
}

impl<'a> GContent<'a> {
    fn user(text: &'a str) -> Self {
        Self {
            role: Some("user"),
            parts: [GPart { text }],
        }
    }
}

#[derive(Serialize)]
struct GPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GGenerateReq<'a> {
    contents: [GContent<'a>; 1],
    #[serde(skip_serializing_if = "is_empty_config")]
    generation_config: &'a GenerateConfig,
}

fn is_empty_config(cfg: &&GenerateConfig) -> bool {
    **cfg == GenerateConfig::default()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GGenerateResp {
    #[serde(default)]
    candidates: Vec<GCandidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GCandidate {
    #[serde(default)]
    content: Option<GRespContent>,
    #[serde(default)]
    safety_ratings: Option<Vec<SafetyRating>>,
}

#[derive(Deserialize)]
struct GRespContent {
    #[serde(default)]
    parts: Vec<GRespPart>,
}

#[derive(Deserialize)]
struct GRespPart {
    #[serde(default)]
    text: Option<String>,
}

impl GCandidate {
    fn text(&self) -> String {
        self.content
            .as_ref()
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GEmbedReq<'a> {
    model: String,
    content: GContent<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<u32>,
}

#[derive(Deserialize)]
struct GEmbedResp {
    embedding: Option<GEmbedding>,
}

#[derive(Deserialize)]
struct GEmbedding {
    values: Vec<f32>,
}

#[derive(Serialize)]
struct GCountReq<'a> {
    contents: [GContent<'a>; 1],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GCountResp {
    #[serde(default)]
    total_tokens: u64,
}

/// Text of one SSE `data:` line, or `None` for anything else.
fn parse_sse_line(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim();
    (!data.is_empty()).then_some(data)
}

#[async_trait]
impl GenAiBackend for Gemini {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, req: GenerateRequest) -> CoreResult<GenerateResponse> {
        let payload = GGenerateReq {
            contents: [GContent::user(&req.prompt)],
            generation_config: &req.config,
        };
        let url = self.url(&req.model, "generateContent");
        let resp: GGenerateResp = self
            .http
            .post_json(&self.name, &url, &payload, &self.headers())
            .await?;

        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| self.malformed("response has no candidates"))?;
        Ok(GenerateResponse {
            text: candidate.text(),
            safety_ratings: candidate.safety_ratings,
        })
    }

    async fn generate_stream(&self, req: GenerateRequest) -> CoreResult<ChunkStream> {
        let payload = GGenerateReq {
            contents: [GContent::user(&req.prompt)],
            generation_config: &req.config,
        };
        let url = format!("{}?alt=sse", self.url(&req.model, "streamGenerateContent"));
        let lines = self
            .http
            .post_sse_lines(&self.name, &url, &payload, &self.headers())
            .await?;

        let provider = self.name.clone();
        let chunks = lines.filter_map(move |line| {
            let item = match line {
                Err(e) => Some(Err(e)),
                Ok(line) => parse_sse_line(&line).and_then(|data| {
                    match serde_json::from_str::<GGenerateResp>(data) {
                        Ok(resp) => {
                            let text: String = resp.candidates.iter().map(GCandidate::text).collect();
                            (!text.is_empty()).then(|| Ok(GenerateChunk { text }))
                        }
                        Err(e) => Some(Err(GenAiError::MalformedResponse {
                            provider: provider.clone(),
                            message: format!("bad stream event: {e}"),
                        })),
                    }
                }),
            };
            future::ready(item)
        });
        Ok(Box::pin(chunks))
    }

    async fn embed(&self, req: EmbedRequest) -> CoreResult<Vec<f32>> {
        let model = req.model.strip_prefix("models/").unwrap_or(&req.model);
        let payload = GEmbedReq {
            model: format!("models/{model}"),
            content: GContent {
                role: None,
                parts: [GPart { text: &req.content }],
            },
            output_dimensionality: req.config.output_dimensionality,
        };
        let url = self.url(&req.model, "embedContent");
        let resp: GEmbedResp = self
            .http
            .post_json(&self.name, &url, &payload, &self.headers())
            .await?;
        resp.embedding
            .map(|e| e.values)
            .ok_or_else(|| self.malformed("response has no embedding"))
    }

    async fn count_tokens(&self, model: &str, text: &str) -> CoreResult<TokenCount> {
        let payload = GCountReq {
            contents: [GContent::user(text)],
        };
        let url = self.url(model, "countTokens");
        let resp: GCountResp = self
            .http
            .post_json(&self.name, &url, &payload, &self.headers())
            .await?;
        Ok(TokenCount {
            total_tokens: resp.total_tokens,
            prompt_tokens: resp.total_tokens,
            completion_tokens: 0,
        })
    }
}
