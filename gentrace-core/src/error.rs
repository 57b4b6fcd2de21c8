use thiserror::Error;

/// Core error type for gentrace.
///
/// Backend failures travel through the instrumented client as the very same
/// value the backend produced, so callers can keep matching on variants or on
/// the `Display` text.
#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("rate limited by provider {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<u64>,
    },

    #[error("provider unavailable: {provider}")]
    ProviderUnavailable { provider: String },

    #[error("upstream error from {provider}: {code} {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    #[error("telemetry setup failed: {0}")]
    Telemetry(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = std::result::Result<T, GenAiError>;
