use std::sync::Arc;

use secrecy::SecretString;

use crate::backend::{GenAiBackend, NullBackend};
use crate::config::Config;
use crate::error::{CoreResult, GenAiError};
use crate::http_client::HttpClient;
use crate::providers::gemini::Gemini;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gemini,
    Null,
}

/// Build a backend from configuration.
///
/// For Gemini the API key is read from the environment variable named by
/// `backend.api_key_env`; an unset or blank variable is a `MissingCredential`.
pub fn build_backend(kind: BackendKind, cfg: &Config) -> CoreResult<Arc<dyn GenAiBackend>> {
    match kind {
        BackendKind::Null => Ok(Arc::new(NullBackend)),
        BackendKind::Gemini => {
            let env = &cfg.backend.api_key_env;
            let api_key = std::env::var(env)
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    GenAiError::MissingCredential(format!(
                        "environment variable {env} is not set or empty"
                    ))
                })?;
            let http = HttpClient::new(&cfg.http)?;
            let gemini = Gemini::new(http, SecretString::from(api_key), cfg.backend.base.clone())?;
            Ok(Arc::new(gemini))
        }
    }
}
