use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use taglens_core::ChatMessage;
use tracing::warn;

use crate::LlmProfile;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one OpenAI-compatible `/chat/completions` endpoint.
///
/// Transport failures retry with exponential backoff; a response that
/// arrives but cannot be read as a chat completion is terminal, since
/// retrying will not make the upstream change its mind about the payload.
pub struct LlmClient {
    client: Client,
    profile: LlmProfile,
}

impl LlmClient {
    pub fn new(profile: LlmProfile) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, profile })
    }

    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = RETRY_BASE * 2u32.pow(attempt - 1);
                warn!(
                    attempt,
                    model = %self.profile.model,
                    "chat request failed, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }

            match self.send(messages).await {
                Ok(body) => return extract_content(&body),
                Err(err) => last_error = Some(err),
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("all chat attempts failed")))
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatCompletionsRequest {
            model: &self.profile.model,
            messages,
            temperature: 0.1,
            max_tokens: 2000,
            top_p: 0.95,
            frequency_penalty: 0,
            presence_penalty: 0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.profile.base_url))
            .header("Authorization", format!("Bearer {}", self.profile.api_key))
            .json(&request)
            .send()
            .await
            .with_context(|| {
                format!("sending chat request to {}", self.profile.base_url)
            })?;

        response.text().await.context("reading chat response body")
    }
}

fn extract_content(body: &str) -> Result<String> {
    let parsed: ChatCompletionsResponse = serde_json::from_str(body)
        .with_context(|| format!("unparseable chat response: {body}"))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("no choices in chat response: {body}"))
}

#[derive(Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: u32,
    presence_penalty: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_choice_content() {
        let body = r#"{"id":"x","choices":[{"message":{"role":"assistant","content":"{\"tag\":\"tsj_nothave\"}"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), r#"{"tag":"tsj_nothave"}"#);
    }

    #[test]
    fn empty_choices_is_an_error_with_body() {
        let err = extract_content(r#"{"choices":[]}"#).unwrap_err();
        assert!(err.to_string().contains("choices"));
    }

    #[test]
    fn non_json_body_is_an_error() {
        assert!(extract_content("upstream proxy error").is_err());
    }
}
