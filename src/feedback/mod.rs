pub mod anthropic;
pub mod openai;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::settings::FeedbackSettings;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use prompt::UI_FEEDBACK_PROMPT;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider}: API key is not a valid header value")]
    InvalidApiKey { provider: &'static str },

    #[error("{provider}: failed to build HTTP client: {source}")]
    Client {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider}: request failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider}: API returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider}: response is not valid JSON: {source}")]
    Parse {
        provider: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{provider}: response contained no text")]
    EmptyResponse { provider: &'static str },
}

/// A backend that critiques a captured PNG.
#[async_trait]
pub trait FeedbackProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn feedback(&self, image_png: &[u8]) -> Result<String, ProviderError>;
}

/// Provider variants selectable by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Disabled,
}

const PROVIDER_KEYS: &[(&str, ProviderKind)] = &[
    ("anthropic", ProviderKind::Anthropic),
    ("claude", ProviderKind::Anthropic),
    ("openai", ProviderKind::OpenAi),
    ("gpt", ProviderKind::OpenAi),
    ("none", ProviderKind::Disabled),
    ("off", ProviderKind::Disabled),
];

pub const DEFAULT_PROVIDER: ProviderKind = ProviderKind::Anthropic;

impl ProviderKind {
    /// Map a provider key. Absent or unrecognized keys select the default.
    pub fn from_key(key: Option<&str>) -> Self {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return DEFAULT_PROVIDER;
        };
        let lowered = key.to_ascii_lowercase();
        PROVIDER_KEYS
            .iter()
            .find(|(k, _)| *k == lowered)
            .map(|(_, kind)| *kind)
            .unwrap_or_else(|| {
                warn!(provider = %key, "Unknown feedback provider, falling back to default");
                DEFAULT_PROVIDER
            })
    }
}

/// Build the configured provider. `None` means feedback is disabled, either
/// explicitly or because the selected provider has no API key.
pub fn select_provider(settings: &FeedbackSettings) -> Option<Arc<dyn FeedbackProvider>> {
    let kind = ProviderKind::from_key(settings.provider.as_deref());

    let built: Result<Arc<dyn FeedbackProvider>, ProviderError> = match kind {
        ProviderKind::Disabled => {
            info!("Feedback provider disabled");
            return None;
        }
        ProviderKind::Anthropic => {
            let Some(key) = settings.anthropic_api_key.as_deref() else {
                warn!("ANTHROPIC_API_KEY not set; feedback disabled");
                return None;
            };
            AnthropicProvider::new(key, settings).map(|p| Arc::new(p) as Arc<dyn FeedbackProvider>)
        }
        ProviderKind::OpenAi => {
            let Some(key) = settings.openai_api_key.as_deref() else {
                warn!("OPENAI_API_KEY not set; feedback disabled");
                return None;
            };
            OpenAiProvider::new(key, settings).map(|p| Arc::new(p) as Arc<dyn FeedbackProvider>)
        }
    };

    match built {
        Ok(provider) => {
            info!(provider = provider.name(), "Feedback provider configured");
            Some(provider)
        }
        Err(e) => {
            warn!(error = %e, "Failed to configure feedback provider; feedback disabled");
            None
        }
    }
}

/// Send a JSON request and return the parsed JSON body, mapping non-2xx
/// statuses to [`ProviderError::Status`].
pub(crate) async fn post_json(
    provider: &'static str,
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value, ProviderError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|source| ProviderError::Request { provider, source })?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|source| ProviderError::Request { provider, source })?;

    if !status.is_success() {
        return Err(ProviderError::Status {
            provider,
            status: status.as_u16(),
            body: text,
        });
    }

    serde_json::from_str(&text).map_err(|source| ProviderError::Parse { provider, source })
}

/// Concatenate the text found in a content value: a plain string, or an
/// array of parts carrying `text`.
pub(crate) fn collect_text(content: &Value) -> Option<String> {
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter(|p| p.get("type").and_then(Value::as_str).is_none_or(|t| t == "text"))
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n\n"),
        _ => return None,
    };
    if text.trim().is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collect_text_from_string_and_parts() {
        assert_eq!(collect_text(&json!("hi")).as_deref(), Some("hi"));
        let parts = json!([
            { "type": "text", "text": "a" },
            { "type": "tool_use", "name": "x" },
            { "type": "text", "text": "b" }
        ]);
        assert_eq!(collect_text(&parts).as_deref(), Some("a\n\nb"));
        assert_eq!(collect_text(&json!([])), None);
        assert_eq!(collect_text(&json!(null)), None);
    }
}
