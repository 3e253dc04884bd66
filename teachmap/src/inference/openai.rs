//! OpenAI chat-completions backend.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::{prompt, InferenceBackend, InferenceContext};
use crate::config::RunConfig;
use crate::error::{InferenceError, InferenceResult};
use crate::models::Field;

/// Fields requested per call.
const DEFAULT_MAX_BATCH: usize = 8;

const DEFAULT_TEMPERATURE: f32 = 0.3;

const DEFAULT_MAX_TOKENS: u32 = 800;

/// Chat-completions client in JSON mode.
#[derive(Clone)]
pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl OpenAiBackend {
    /// Create a backend with explicit settings.
    pub fn new(api_key: String, model: &str, api_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: model.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Create a backend from the run configuration.
    pub fn from_config(config: &RunConfig) -> InferenceResult<Self> {
        let api_key = config.api_key.clone().ok_or(InferenceError::MissingApiKey)?;
        Ok(Self::new(api_key, &config.model, &config.api_base))
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.api_base)
    }
}

#[async_trait]
impl InferenceBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn max_batch(&self) -> usize {
        DEFAULT_MAX_BATCH
    }

    async fn infer(
        &self,
        fields: &[Field],
        context: &InferenceContext,
    ) -> InferenceResult<BTreeMap<Field, String>> {
        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt::system_prompt() },
                { "role": "user", "content": prompt::user_prompt(fields, context) }
            ],
            "response_format": { "type": "json_object" },
            "temperature": DEFAULT_TEMPERATURE,
            "max_tokens": self.max_tokens
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let body = response.text().await.map_err(map_transport_error)?;

        if status.as_u16() == 429 {
            return Err(InferenceError::RateLimited(retry_after));
        }
        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            return Err(InferenceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let response: ChatResponse =
            serde_json::from_str(&body).map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| InferenceError::InvalidResponse("Empty response".to_string()))?;

        parse_answers(&content, fields)
    }
}

fn map_transport_error(err: reqwest::Error) -> InferenceError {
    if err.is_timeout() {
        InferenceError::Timeout
    } else {
        InferenceError::Network(err.to_string())
    }
}

/// Pick the requested fields out of the model's JSON answer.
fn parse_answers(content: &str, fields: &[Field]) -> InferenceResult<BTreeMap<Field, String>> {
    let json_str = extract_json(content);
    let parsed: Value = serde_json::from_str(&json_str).map_err(|e| {
        InferenceError::InvalidResponse(format!(
            "{}. Response was: {}",
            e,
            content.chars().take(200).collect::<String>()
        ))
    })?;

    let object = parsed
        .as_object()
        .ok_or_else(|| InferenceError::InvalidResponse("Expected a JSON object".to_string()))?;

    let mut answers = BTreeMap::new();
    for field in fields {
        let value = object
            .get(field.name())
            .or_else(|| object.iter().find(|(k, _)| Field::from_label(k) == Some(*field)).map(|(_, v)| v));

        if let Some(text) = value.and_then(value_to_text) {
            answers.insert(*field, text);
        }
    }
    Ok(answers)
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_to_text).collect();
            Some(parts.join(", "))
        }
        Value::Null | Value::Object(_) => None,
    }
}

/// Extract JSON from a response that may contain markdown code blocks
fn extract_json(text: &str) -> String {
    if let Some(start) = text.find("```") {
        let after_start = start + 3;
        // Skip language identifier if present
        let content_start = text[after_start..]
            .find('\n')
            .map(|i| after_start + i + 1)
            .unwrap_or(after_start);

        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return text[start..=end].to_string();
        }
    }

    text.trim().to_string()
}
