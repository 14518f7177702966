//! OpenAI-compatible chat-completions classifier.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::provider::ReceiptClassifier;
use super::schema;
use crate::channels::email_types::Attachment;
use crate::error::LlmError;
use crate::pipeline::types::ClassificationResponse;

const PROVIDER: &str = "openai";

/// Classifier backed by `/chat/completions` with strict structured output.
pub struct OpenAiClassifier {
    api_key: SecretString,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiClassifier {
    pub fn new(api_key: SecretString, base_url: &str, model: &str) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ReceiptClassifier for OpenAiClassifier {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn classify(
        &self,
        body: &str,
        attachments: &[Attachment],
    ) -> Result<ClassificationResponse, LlmError> {
        let request = build_request_body(&self.model, body, attachments);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LlmError::AuthFailed {
                provider: PROVIDER.into(),
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(LlmError::RateLimited {
                provider: PROVIDER.into(),
                retry_after,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let text = response.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.into(),
            reason: format!("failed to read response body: {e}"),
        })?;
        debug!(
            model = %self.model,
            raw = %text.chars().take(1000).collect::<String>(),
            "Classifier raw response"
        );

        parse_completion(&text)
    }
}

/// Build the chat-completions payload.
///
/// User content order: one part per attachment, the email body, then the
/// explicit list of attachment names.
pub(crate) fn build_request_body(model: &str, body: &str, attachments: &[Attachment]) -> Value {
    let mut content: Vec<Value> = attachments.iter().map(attachment_part).collect();

    content.push(json!({"type": "text", "text": body}));

    if !attachments.is_empty() {
        let names: Vec<&str> = attachments.iter().map(Attachment::display_name).collect();
        content.push(json!({
            "type": "text",
            "text": format!("Attachment filenames: {}", names.join(", ")),
        }));
    }

    json!({
        "model": model,
        "messages": [
            {"role": "system", "content": schema::system_prompt()},
            {"role": "user", "content": content}
        ],
        "response_format": schema::response_format(),
    })
}

/// Images go in as `image_url`; everything else as a `file` part.
fn attachment_part(attachment: &Attachment) -> Value {
    if attachment.mime_type.starts_with("image/") {
        json!({
            "type": "image_url",
            "image_url": {"url": attachment.data_uri()},
        })
    } else {
        json!({
            "type": "file",
            "file": {
                "filename": attachment.display_name(),
                "file_data": attachment.data_uri(),
            },
        })
    }
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

/// Decode a chat-completions response into the typed classification.
pub(crate) fn parse_completion(raw: &str) -> Result<ClassificationResponse, LlmError> {
    let response: CompletionResponse =
        serde_json::from_str(raw).map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.into(),
            reason: format!("malformed completion: {e}"),
        })?;

    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| LlmError::EmptyResponse {
            provider: PROVIDER.into(),
            reason: "no choices".into(),
        })?;

    if let Some(refusal) = message.refusal {
        return Err(LlmError::EmptyResponse {
            provider: PROVIDER.into(),
            reason: format!("refused: {refusal}"),
        });
    }

    let content = message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| LlmError::EmptyResponse {
            provider: PROVIDER.into(),
            reason: "empty message content".into(),
        })?;

    serde_json::from_str(&content).map_err(|e| LlmError::SchemaMismatch {
        provider: PROVIDER.into(),
        reason: e.to_string(),
    })
}
