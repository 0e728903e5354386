use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use tracing::info;

use super::{FeedbackProvider, ProviderError, UI_FEEDBACK_PROMPT, collect_text, post_json};
use crate::settings::FeedbackSettings;

const NAME: &str = "openai";

/// OpenAI Chat Completions with the image sent as a data URL.
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, settings: &FeedbackSettings) -> Result<Self, ProviderError> {
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
                "{}/chat/completions",
                settings.openai_base_url.trim_end_matches('/')
            ),
            api_key: api_key.to_string(),
            model: settings.openai_model.clone(),
            max_tokens: settings.max_tokens,
        })
    }
}

#[async_trait]
impl FeedbackProvider for OpenAiProvider {
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
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/png;base64,{}", image) }
                    }
                ]
            }]
        });

        info!(model = %self.model, bytes = image_png.len(), "Requesting feedback from OpenAI");
        let request = self.client.post(&self.endpoint).bearer_auth(&self.api_key);
        let response = post_json(NAME, request, &body).await?;

        response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(collect_text)
            .ok_or(ProviderError::EmptyResponse { provider: NAME })
    }
}
