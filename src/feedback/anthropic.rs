use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::json;
use tracing::info;

use super::{FeedbackProvider, ProviderError, UI_FEEDBACK_PROMPT, collect_text, post_json};
use crate::settings::FeedbackSettings;

const NAME: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

/// Claude Messages API with a base64 image block.
pub struct AnthropicProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: HeaderValue,
    model: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, settings: &FeedbackSettings) -> Result<Self, ProviderError> {
        let mut api_key = HeaderValue::from_str(api_key)
            .map_err(|_| ProviderError::InvalidApiKey { provider: NAME })?;
        api_key.set_sensitive(true);

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|source| ProviderError::Client {
                provider: NAME,
                source,
            })?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1/messages",
                settings.anthropic_base_url.trim_end_matches('/')
            ),
            api_key,
            model: settings.anthropic_model.clone(),
            max_tokens: settings.max_tokens,
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-api-key"), self.api_key.clone());
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(API_VERSION),
        );
        headers
    }
}

#[async_trait]
impl FeedbackProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn feedback(&self, image_png: &[u8]) -> Result<String, ProviderError> {
        let image = base64::engine::general_purpose::STANDARD.encode(image_png);
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": UI_FEEDBACK_PROMPT },
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/png",
                            "data": image,
                        }
                    }
                ]
            }]
        });

        info!(model = %self.model, bytes = image_png.len(), "Requesting feedback from Anthropic");
        let request = self.client.post(&self.endpoint).headers(self.headers());
        let response = post_json(NAME, request, &body).await?;

        response
            .get("content")
            .and_then(collect_text)
            .ok_or(ProviderError::EmptyResponse { provider: NAME })
    }
}
