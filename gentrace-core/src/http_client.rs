use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::Stream;
use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use crate::config::HttpCfg;
use crate::error::{CoreResult, GenAiError};
use crate::text::truncate;

/// A boxed stream of raw SSE lines (already split on `\n`, line ending removed).
pub type SseStream = Pin<Box<dyn Stream<Item = CoreResult<String>> + Send>>;

type ByteStream = Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

/// Thin wrapper around reqwest::Client with defaults and helpers.
///
/// Every error carries the `provider` label passed by the caller.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.request_timeout_ms));
        if let Some(n) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        let inner = builder
            .build()
            .map_err(|e| GenAiError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: concat!("gentrace/", env!("CARGO_PKG_VERSION")).to_string(),
        })
    }

    pub fn new_default() -> CoreResult<Self> {
        Self::new(&HttpCfg::default())
    }

    pub async fn post_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        provider: &str,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> CoreResult<R> {
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req
            .send()
            .await
            .map_err(|_e| GenAiError::ProviderUnavailable {
                provider: provider.into(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let ra = parse_retry_after(resp.headers());
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(provider, status, ra, &text));
        }

        resp.json::<R>()
            .await
            .map_err(|e| GenAiError::ProviderError {
                provider: provider.into(),
                code: status.as_u16().to_string(),
                message: format!("json decode error: {e}"),
            })
    }

    /// POST JSON and return an SSE (Server-Sent Events) line stream.
    pub async fn post_sse_lines<T: Serialize + ?Sized>(
        &self,
        provider: &str,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> CoreResult<SseStream> {
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "text/event-stream");
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req.send().await.map_err(|_| GenAiError::ProviderUnavailable {
            provider: provider.into(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let ra = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(map_http_error(provider, status, ra, &body));
        }

        Ok(Box::pin(LineStream::new(
            provider,
            Box::pin(resp.bytes_stream()),
        )))
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    if let Some(v) = headers.get("retry-after")
        && let Ok(s) = v.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        return Some(secs);
    }
    // HTTP-date forms are ignored.
    None
}

fn map_http_error(provider: &str, status: StatusCode, retry_after: Option<u64>, body: &str) -> GenAiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => GenAiError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        },
        s if s.is_server_error() => GenAiError::ProviderUnavailable {
            provider: provider.to_string(),
        },
        s => GenAiError::ProviderError {
            provider: provider.to_string(),
            code: s.as_u16().to_string(),
            message: truncate(body, 300).into_owned(),
        },
    }
}

/// Line splitter over a bytes stream; yields lines separated by '\n'.
/// Bytes are buffered until a full line is available, so a multibyte char
/// split across network chunks decodes intact.
struct LineStream {
    provider: String,
    inner: ByteStream,
    buf: Vec<u8>,
    flushed_tail: bool,
}

impl LineStream {
    fn new(provider: &str, inner: ByteStream) -> Self {
        Self {
            provider: provider.to_string(),
            inner,
            buf: Vec::new(),
            flushed_tail: false,
        }
    }
}

fn decode_line(mut line: Vec<u8>) -> String {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

impl Stream for LineStream {
    type Item = CoreResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(idx) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buf.drain(..=idx).collect();
                line.pop();
                return Poll::Ready(Some(Ok(decode_line(line))));
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    self.buf.extend_from_slice(&chunk);
                }
                Poll::Ready(Some(Err(_e))) => {
                    return Poll::Ready(Some(Err(GenAiError::ProviderUnavailable {
                        provider: self.provider.clone(),
                    })));
                }
                Poll::Ready(None) => {
                    if !self.flushed_tail && !self.buf.is_empty() {
                        self.flushed_tail = true;
                        let line = std::mem::take(&mut self.buf);
                        return Poll::Ready(Some(Ok(decode_line(line))));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn post_json_success_sends_headers() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST).path("/gen").header("x-test", "yes");
            then.status(200).json_body(json!({"ok": true}));
        });

        #[derive(serde::Deserialize)]
        struct Resp {
            ok: bool,
        }

        let client = HttpClient::new_default().unwrap();
        let resp: Resp = client
            .post_json(
                "gemini",
                &format!("{}/gen", server.base_url()),
                &json!({"msg":"hi"}),
                &[("x-test", "yes")],
            )
            .await
            .unwrap();

        assert!(resp.ok);
        m.assert();
    }

    #[tokio::test]
    async fn post_json_429_maps_to_rate_limited() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/gen");
            then.status(429).header("Retry-After", "1").body("slow down");
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .post_json::<_, serde_json::Value>(
                "gemini",
                &format!("{}/gen", server.base_url()),
                &json!({"msg":"hi"}),
                &[],
            )
            .await
            .unwrap_err();

        match err {
            GenAiError::RateLimited {
                provider,
                retry_after,
            } => {
                assert_eq!(provider, "gemini");
                assert_eq!(retry_after, Some(1));
            }
            other => panic!("expected RateLimited, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn post_json_503_maps_to_unavailable() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/gen");
            then.status(503).body("oops");
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .post_json::<_, serde_json::Value>(
                "gemini",
                &format!("{}/gen", server.base_url()),
                &json!({"msg":"hi"}),
                &[],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GenAiError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn post_json_200_bad_json_maps_to_provider_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/gen");
            then.status(200).body("not-json");
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .post_json::<_, serde_json::Value>(
                "gemini",
                &format!("{}/gen", server.base_url()),
                &json!({"msg":"hi"}),
                &[],
            )
            .await
            .unwrap_err();
        match err {
            GenAiError::ProviderError { code, message, .. } => {
                assert_eq!(code, "200");
                assert!(message.starts_with("json decode error"));
            }
            other => panic!("expected ProviderError, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn post_json_400_truncates_body() {
        let server = MockServer::start();
        let big = "x".repeat(1000);
        let _m = server.mock(|when, then| {
            when.method(POST).path("/gen");
            then.status(400).body(big.clone());
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .post_json::<_, serde_json::Value>(
                "gemini",
                &format!("{}/gen", server.base_url()),
                &json!({"msg":"hi"}),
                &[],
            )
            .await
            .unwrap_err();
        match err {
            GenAiError::ProviderError { code, message, .. } => {
                assert_eq!(code, "400");
                assert!(message.ends_with("..."));
                assert_eq!(message.len(), 303);
            }
            other => panic!("expected ProviderError, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn network_error_maps_to_unavailable() {
        let client = HttpClient::new_default().expect("client");
        let url = "http://127.0.0.1:9/gen"; // port 9 (discard) is typically closed
        let err = client
            .post_json::<_, serde_json::Value>("gemini", url, &json!({"msg":"hi"}), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, GenAiError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn sse_lines_split_on_newlines() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/stream");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body("data: one\r\n\r\ndata: two\n\ntail");
        });
        let client = HttpClient::new_default().expect("client");
        let lines: Vec<String> = client
            .post_sse_lines("gemini", &format!("{}/stream", server.base_url()), &json!({}), &[])
            .await
            .expect("stream")
            .map(|l| l.expect("line"))
            .collect()
            .await;
        assert_eq!(lines, vec!["data: one", "", "data: two", "", "tail"]);
    }

    #[tokio::test]
    async fn line_split_inside_multibyte_char_decodes_intact() {
        let bytes = "data: héllo\n".as_bytes();
        // 'é' is two bytes starting at offset 7; split between them.
        let chunks = vec![
            Ok::<_, reqwest::Error>(bytes::Bytes::copy_from_slice(&bytes[..8])),
            Ok(bytes::Bytes::copy_from_slice(&bytes[8..])),
        ];
        let lines: Vec<String> = LineStream::new("gemini", Box::pin(futures_util::stream::iter(chunks)))
            .map(|l| l.expect("line"))
            .collect()
            .await;
        assert_eq!(lines, vec!["data: héllo"]);
    }
}
