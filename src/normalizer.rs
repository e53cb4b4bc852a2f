//! Normalization: turn extracted text into a [`NormalizedNote`] via an
//! OpenAI-compatible chat-completions endpoint.
//!
//! The HTTP client asks for JSON output, salvages JSON embedded in chatty
//! responses, and re-asks with a fix-it prompt when the model returns
//! something unparseable. Payload coercion is infallible: missing lists
//! become empty, a missing title becomes "Untitled", and confidence is
//! clamped into `[0, 1]`.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::NormalizerConfig;
use crate::models::{ActionItem, Entity, NormalizedNote, SourceInfo};

/// Environment variable holding an optional bearer token for the
/// normalization endpoint. Local servers typically need none.
pub const API_KEY_ENV: &str = "INKLAKE_API_KEY";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("normalization request failed: {0}")]
    Http(String),
    #[error("normalization produced no valid JSON after {attempts} attempts")]
    InvalidJson { attempts: u32 },
}

/// Seam to the language-model normalization service.
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(
        &self,
        text: &str,
        source_info: &SourceInfo,
    ) -> Result<NormalizedNote, NormalizeError>;
}

/// Production normalizer speaking the OpenAI chat-completions protocol.
pub struct HttpNormalizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_retries: u32,
    language: String,
    json_mode: bool,
    api_key: Option<String>,
}

impl HttpNormalizer {
    pub fn new(config: &NormalizerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            language: config.language.clone(),
            json_mode: config.json_mode,
            api_key: std::env::var(API_KEY_ENV).ok(),
        })
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, NormalizeError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.2,
        });
        if self.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NormalizeError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(NormalizeError::Http(format!("{status}: {detail}")));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| NormalizeError::Http(e.to_string()))?;

        json.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or_else(|| NormalizeError::Http("response missing message content".to_string()))
    }

    fn user_prompt(&self, text: &str, source_info: &SourceInfo) -> String {
        let schema = serde_json::json!({
            "title": "string",
            "summary": ["string"],
            "decisions": ["string"],
            "actions": [
                {"what": "string", "who": "string|null", "due": "YYYY-MM-DD|null", "evidence": "string|null"}
            ],
            "entities": [{"type": "person|org|product|place|other", "value": "string"}],
            "tags": ["string"],
            "projects": ["string"],
            "people": ["string"],
            "confidence": 0.0,
        });
        let language_hint = if self.language.to_lowercase().starts_with("ja") {
            "Output content MUST be in Japanese unless the source is clearly another language."
                .to_string()
        } else {
            format!("Output content MUST be in {}.", self.language)
        };
        format!(
            "Normalize the input into the JSON schema below.\nSchema:\n{}\nSource metadata:\n{}\nLanguage:\n{}\nInput:\n{}",
            schema,
            serde_json::to_string(source_info).unwrap_or_default(),
            language_hint,
            text
        )
    }
}

#[async_trait]
impl Normalizer for HttpNormalizer {
    async fn normalize(
        &self,
        text: &str,
        source_info: &SourceInfo,
    ) -> Result<NormalizedNote, NormalizeError> {
        let system = "You are a structured data extractor. \
                      You MUST output valid JSON based on the provided schema.";
        let mut prompt = self.user_prompt(text, source_info);
        let attempts = self.max_retries + 1;
        let mut last_error = NormalizeError::InvalidJson { attempts };

        for attempt in 0..attempts {
            let response_text = match self.chat(system, &prompt).await {
                Ok(content) => content,
                Err(e) => {
                    debug!(attempt, error = %e, "normalization request failed");
                    last_error = e;
                    continue;
                }
            };

            match parse_json_from_text(&response_text) {
                Some(payload) => return Ok(coerce_payload(&payload)),
                None => {
                    debug!(attempt, "normalization response was not valid JSON");
                    last_error = NormalizeError::InvalidJson { attempts };
                    prompt = format!(
                        "Fix the JSON to be valid and match the schema. Return JSON only.\nOriginal response:\n{response_text}"
                    );
                }
            }
        }

        Err(last_error)
    }
}

/// Parse a JSON object from model output, salvaging one embedded in
/// surrounding prose by slicing from the first `{` to the last `}`.
pub fn parse_json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

/// Validated construction of a [`NormalizedNote`] from a loose payload.
pub fn coerce_payload(data: &Value) -> NormalizedNote {
    let confidence = data
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    let title = coerce_string(data.get("title"))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    NormalizedNote {
        title,
        summary: coerce_string_list(data.get("summary")),
        decisions: coerce_string_list(data.get("decisions")),
        actions: coerce_actions(data.get("actions")),
        entities: coerce_entities(data.get("entities")),
        tags: coerce_string_list(data.get("tags")),
        projects: coerce_string_list(data.get("projects")),
        people: coerce_string_list(data.get("people")),
        confidence,
    }
}

fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .filter_map(|item| coerce_string(Some(item)))
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => coerce_string(Some(other)).into_iter().collect(),
    }
}

fn coerce_actions(value: Option<&Value>) -> Vec<ActionItem> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|item| ActionItem {
            what: coerce_string(item.get("what"))
                .filter(|w| !w.is_empty())
                .unwrap_or_else(|| "unspecified".to_string()),
            who: coerce_string(item.get("who")),
            due: coerce_string(item.get("due")),
            evidence: coerce_string(item.get("evidence")),
        })
        .collect()
}

fn coerce_entities(value: Option<&Value>) -> Vec<Entity> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|item| Entity {
            kind: coerce_string(item.get("type"))
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| "other".to_string()),
            value: coerce_string(item.get("value")).unwrap_or_default(),
        })
        .collect()
}
