use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{
    map_object, response_json_or_error, GenerationRequest, GenerationResponse, ImageProvider,
    InlineImage,
};
use crate::error::StartupError;

pub const CREDENTIAL_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, StartupError> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(StartupError::MissingCredentials(CREDENTIAL_ENV_VARS.join(" or ")));
        }
        let mut builder = HttpClient::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(StartupError::Client)?;
        Ok(Self {
            api_base: api_base
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key,
            http,
        })
    }

    pub fn from_lookup(
        api_base: Option<&str>,
        timeout: Option<Duration>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StartupError> {
        let api_key = CREDENTIAL_ENV_VARS
            .iter()
            .filter_map(|key| lookup(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .ok_or_else(|| StartupError::MissingCredentials(CREDENTIAL_ENV_VARS.join(" or ")))?;
        Self::new(api_key, api_base, timeout)
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    pub(crate) fn build_payload(request: &GenerationRequest<'_>) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": request.prompt },
                    {
                        "inlineData": {
                            "mimeType": request.mime_type,
                            "data": BASE64.encode(request.image),
                        }
                    }
                ],
            }],
            "generationConfig": {
                "temperature": request.settings.temperature,
                "topP": request.settings.top_p,
                "responseModalities": ["TEXT", "IMAGE"],
            },
        })
    }

    pub(crate) fn parse_response(payload: Value) -> Result<GenerationResponse> {
        let parsed: GenerateContentResponse = serde_json::from_value(payload)
            .context("Gemini response did not match the generateContent shape")?;

        let mut image: Option<InlineImage> = None;
        let mut extra_images = 0usize;
        let mut texts: Vec<String> = Vec::new();
        let mut finish_reasons: Vec<String> = Vec::new();
        for candidate in &parsed.candidates {
            if let Some(reason) = candidate.finish_reason.as_deref() {
                finish_reasons.push(reason.to_string());
            }
            let parts = candidate
                .content
                .as_ref()
                .map(|content| content.parts.as_slice())
                .unwrap_or_default();
            for part in parts {
                if let Some(text) = part.text.as_deref().map(str::trim) {
                    if !text.is_empty() {
                        texts.push(text.to_string());
                    }
                }
                let Some(inline) = part.inline_data.as_ref() else {
                    continue;
                };
                let data = inline.data.as_deref().unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                if image.is_some() {
                    extra_images += 1;
                    continue;
                }
                let bytes = BASE64
                    .decode(data.as_bytes())
                    .context("Gemini image base64 decode failed")?;
                image = Some(InlineImage {
                    bytes,
                    mime_type: inline.mime_type.clone(),
                });
            }
        }

        let block_reason = parsed
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.clone());
        let text = if !texts.is_empty() {
            Some(texts.join("\n"))
        } else if let Some(reason) = block_reason.as_deref() {
            Some(format!("prompt blocked: {reason}"))
        } else {
            finish_reasons
                .iter()
                .find(|reason| reason.as_str() != "STOP")
                .map(|reason| format!("finish reason: {reason}"))
        };

        let mut warnings = Vec::new();
        if extra_images > 0 {
            warnings.push(format!(
                "ignored {extra_images} additional inline image(s); kept the first"
            ));
        }
        if image.is_some() {
            if let Some(reason) = finish_reasons.iter().find(|reason| reason.as_str() != "STOP") {
                warnings.push(format!("image returned with finish reason {reason}"));
            }
        }

        Ok(GenerationResponse {
            image,
            text,
            provider_request: Map::new(),
            provider_response: map_object(json!({
                "candidates": parsed.candidates.len(),
                "finish_reasons": finish_reasons,
                "block_reason": block_reason,
                "usage_metadata": parsed.usage_metadata.unwrap_or(Value::Null),
            })),
            warnings,
        })
    }
}

impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerationRequest<'_>) -> Result<GenerationResponse> {
        let endpoint = self.endpoint_for_model(request.model);
        let payload = Self::build_payload(request);
        debug!(%endpoint, bytes = request.image.len(), "sending Gemini generateContent");

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;

        let mut result = Self::parse_response(response_payload)?;
        result.provider_request = map_object(json!({
            "endpoint": endpoint,
            "payload": payload,
        }));
        Ok(result)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(alias = "prompt_feedback")]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(alias = "usage_metadata")]
    usage_metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[serde(alias = "finish_reason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    #[serde(alias = "inline_data")]
    inline_data: Option<Blob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    #[serde(alias = "mime_type")]
    mime_type: Option<String>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(alias = "block_reason")]
    block_reason: Option<String>,
}
