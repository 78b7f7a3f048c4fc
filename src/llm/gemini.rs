use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::PortraitImage;
use crate::llm::VisionModel;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const GEMINI_REQUEST_TIMEOUT_SECS: u64 = 90;

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

// The model can answer with text or inline media; description calls only use
// the text parts, but the payload must still deserialize when images show up.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    #[allow(dead_code)]
    data: String,
}

fn redact_api_key(text: &str, api_key: &str) -> String {
    let key = api_key.trim();
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        "permissive" => "OFF",
        _ => {
            warn!(
                "Unknown safety settings profile '{}', using permissive defaults.",
                profile
            );
            "OFF"
        }
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_CIVIC_INTEGRITY", "threshold": threshold }),
    ]
}

fn summarize_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let mut summarized = Vec::new();
        for content in contents {
            let role = content
                .get("role")
                .and_then(|value| value.as_str())
                .unwrap_or("user");
            let parts = content
                .get("parts")
                .and_then(|value| value.as_array())
                .map(|parts| summarize_parts(parts))
                .unwrap_or_default();
            summarized.push(json!({ "role": role, "parts": parts }));
        }
        summary.insert("contents".to_string(), Value::Array(summarized));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    if let Some(safety) = payload
        .get("safetySettings")
        .and_then(|value| value.as_array())
    {
        summary.insert("safetySettingsCount".to_string(), json!(safety.len()));
    }

    Value::Object(summary)
}

fn summarize_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    for candidate in candidates {
        if let Some(content) = &candidate.content {
            if let Some(parts) = &content.parts {
                for part in parts {
                    match part {
                        GeminiPart::Text { text } => {
                            text_parts += 1;
                            if text_preview.is_none() && !text.trim().is_empty() {
                                text_preview = Some(truncate_for_log(text, 200));
                            }
                        }
                        GeminiPart::InlineData { inline_data } => {
                            if inline_data.mime_type.starts_with("image/") {
                                image_parts += 1;
                            }
                        }
                    }
                }
            }
        }
    }

    json!({
        "candidates": candidates.len(),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn extract_text_from_response(response: GeminiResponse) -> String {
    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        if let Some(content) = candidate.content {
            if let Some(parts) = content.parts {
                for part in parts {
                    if let GeminiPart::Text { text } = part {
                        if !text.trim().is_empty() {
                            text_parts.push(text);
                        }
                    }
                }
            }
        }
    }
    text_parts.join("\n")
}

async fn call_gemini_api(model: &str, api_key: &str, payload: Value) -> Result<GeminiResponse> {
    let client = get_http_client();
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
        model, api_key
    );

    if tracing::enabled!(tracing::Level::DEBUG) {
        debug!(target: "llm.gemini", model = model, payload = %summarize_payload(&payload));
    }

    let response = client
        .post(&url)
        .timeout(Duration::from_secs(GEMINI_REQUEST_TIMEOUT_SECS))
        .json(&payload)
        .send()
        .await
        .map_err(|err| {
            let err_text = redact_api_key(&err.to_string(), api_key);
            warn!(
                "Gemini request failed to send: {} (timeout={}, connect={}, status={:?})",
                err_text,
                err.is_timeout(),
                err.is_connect(),
                err.status()
            );
            anyhow!("Gemini request failed: {}", err_text)
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let (message, body_summary) = summarize_error_body(&body);
        warn!("Gemini API error: status={}, body={}", status, body_summary);
        let detail = message.unwrap_or(body_summary);
        return Err(anyhow!(
            "Gemini request failed with status {}: {}",
            status,
            redact_api_key(&detail, api_key)
        ));
    }

    let value = response.json::<GeminiResponse>().await?;
    if tracing::enabled!(tracing::Level::DEBUG) {
        debug!(target: "llm.gemini", model = model, response = %summarize_response(&value));
    }
    Ok(value)
}

/// Gemini-backed [`VisionModel`]. Sends the transformation prompt together
/// with the portrait as an `inlineData` part and returns the text parts of
/// the first reply.
pub struct GeminiVision {
    config: Arc<Config>,
}

impl GeminiVision {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    fn build_payload(&self, prompt: &str, portrait: &PortraitImage) -> Value {
        let parts = vec![
            json!({ "text": prompt }),
            json!({
                "inlineData": {
                    "mimeType": portrait.mime_type,
                    "data": general_purpose::STANDARD.encode(&portrait.bytes)
                }
            }),
        ];

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": self.config.gemini_temperature,
                "topK": self.config.gemini_top_k,
                "topP": self.config.gemini_top_p,
                "maxOutputTokens": self.config.gemini_max_output_tokens,
            },
            "safetySettings": build_safety_settings(&self.config.gemini_safety_settings),
        })
    }
}

#[async_trait]
impl VisionModel for GeminiVision {
    async fn describe_portrait(&self, prompt: &str, portrait: &PortraitImage) -> Result<String> {
        let payload = self.build_payload(prompt, portrait);
        let model = self.config.gemini_vision_model.clone();
        let api_key = self.config.gemini_api_key.clone();

        log_llm_timing("gemini", &model, "describe_portrait", None, || async {
            let response = call_gemini_api(&model, &api_key, payload).await?;
            let description = extract_text_from_response(response);
            if description.trim().is_empty() {
                return Err(anyhow!("Gemini returned no text (model: {})", model));
            }
            Ok(description)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_portrait() -> PortraitImage {
        PortraitImage {
            bytes: vec![0u8; 16],
            mime_type: "image/png".to_string(),
            width: 2,
            height: 2,
        }
    }

    #[test]
    fn payload_carries_prompt_and_inline_image() {
        let vision = GeminiVision::new(Arc::new(Config::for_tests()));
        let payload = vision.build_payload("describe the portrait", &sample_portrait());

        let parts = payload
            .pointer("/contents/0/parts")
            .and_then(|value| value.as_array())
            .expect("parts array");
        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[0].get("text").and_then(|v| v.as_str()),
            Some("describe the portrait")
        );
        assert_eq!(
            parts[1].pointer("/inlineData/mimeType").and_then(|v| v.as_str()),
            Some("image/png")
        );
        assert_eq!(
            payload
                .pointer("/generationConfig/maxOutputTokens")
                .and_then(|v| v.as_i64()),
            Some(2048)
        );
    }

    #[test]
    fn extracts_and_joins_text_parts() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "A calm face." },
                        { "inlineData": { "mimeType": "image/png", "data": "AAAA" } },
                        { "text": "Soft lighting." }
                    ]
                }
            }]
        }))
        .expect("deserialize");

        assert_eq!(
            extract_text_from_response(response),
            "A calm face.\nSoft lighting."
        );
    }

    #[test]
    fn redacts_the_api_key_from_log_text() {
        let scrubbed = redact_api_key("error for key=secret-key-1", "secret-key-1");
        assert_eq!(scrubbed, "error for key=[redacted]");
    }

    #[test]
    fn prefers_the_error_message_pointer_in_error_bodies() {
        let (message, summary) =
            summarize_error_body(r#"{"error": {"message": "quota exhausted"}}"#);
        assert_eq!(message.as_deref(), Some("quota exhausted"));
        assert!(summary.contains("quota exhausted"));
    }

    #[test]
    fn standard_profile_blocks_medium_and_above() {
        let settings = build_safety_settings("standard");
        assert_eq!(settings.len(), 5);
        for entry in settings {
            assert_eq!(
                entry.get("threshold").and_then(|v| v.as_str()),
                Some("BLOCK_MEDIUM_AND_ABOVE")
            );
        }
    }
}
