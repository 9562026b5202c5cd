mod dryrun;
mod gemini;

use anyhow::{bail, Context, Result};
use mannequin_contracts::config::{GenerationSettings, MannequinConfig};
use mannequin_contracts::models::ModelSpec;
use reqwest::blocking::Response as HttpResponse;
use serde_json::{Map, Value};

use crate::error::{ProviderRejection, StartupError};

pub use dryrun::DryrunProvider;
pub use gemini::{GeminiProvider, CREDENTIAL_ENV_VARS};

/// One generation call: the instruction plus the user's photo.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub image: &'a [u8],
    pub mime_type: &'a str,
    pub settings: &'a GenerationSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// What came back from a provider. `image` is the first inline image
/// payload in the response; `text` collects any diagnostic text.
#[derive(Debug, Clone, Default)]
pub struct GenerationResponse {
    pub image: Option<InlineImage>,
    pub text: Option<String>,
    pub provider_request: Map<String, Value>,
    pub provider_response: Map<String, Value>,
    pub warnings: Vec<String>,
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<GenerationResponse>;
}

/// Builds the provider behind `model`. Missing credentials surface here,
/// before any request is made. `lookup` resolves environment variables.
pub fn provider_for_model(
    model: &ModelSpec,
    config: &MannequinConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn ImageProvider>, StartupError> {
    match model.provider.as_str() {
        "dryrun" => Ok(Box::new(DryrunProvider)),
        "gemini" => {
            let provider = GeminiProvider::from_lookup(
                config.api_base.as_deref(),
                config.generation.request_timeout(),
                lookup,
            )?;
            Ok(Box::new(provider))
        }
        other => Err(StartupError::ProviderUnavailable {
            provider: other.to_string(),
            model: model.name.clone(),
        }),
    }
}

pub(crate) fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        if let Some(rejection) = rejection_for_status(provider, code, &body) {
            return Err(rejection.into());
        }
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Maps HTTP answers that no other angle could succeed against. Everything
/// else stays a per-angle request failure.
pub(crate) fn rejection_for_status(
    provider: &str,
    status: u16,
    body: &str,
) -> Option<ProviderRejection> {
    let lowered = body.to_ascii_lowercase();
    let bad_key = lowered.contains("api_key_invalid") || lowered.contains("api key not valid");
    let provider = provider.to_string();
    let detail = error_detail(body);
    match status {
        401 | 403 => Some(ProviderRejection::Credentials {
            provider,
            status,
            detail,
        }),
        400 if bad_key => Some(ProviderRejection::Credentials {
            provider,
            status,
            detail,
        }),
        404 => Some(ProviderRejection::ModelUnavailable {
            provider,
            status,
            detail,
        }),
        _ => None,
    }
}

// Google-style bodies carry the readable part in `error.message`.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| truncate_text(body.trim(), 512))
}

/// Flattens an error chain into one line, skipping repeated messages.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use mannequin_contracts::config::MannequinConfig;
    use mannequin_contracts::models::{ModelRegistry, ModelSpec};

    use super::{error_chain_text, provider_for_model, rejection_for_status, truncate_text};
    use crate::error::{ProviderRejection, StartupError};

    #[test]
    fn dryrun_needs_no_credentials() {
        let registry = ModelRegistry::default();
        let model = registry.get("dryrun-image-1").unwrap();
        let provider = provider_for_model(model, &MannequinConfig::default(), |_| None)
            .unwrap();
        assert_eq!(provider.name(), "dryrun");
    }

    #[test]
    fn gemini_without_key_is_fatal() {
        let registry = ModelRegistry::default();
        let model = registry.get("gemini-2.5-flash-image").unwrap();
        let err = provider_for_model(model, &MannequinConfig::default(), |_| None).err();
        assert!(matches!(err, Some(StartupError::MissingCredentials(_))));

        let ok = provider_for_model(model, &MannequinConfig::default(), |key| {
            (key == "GOOGLE_API_KEY").then(|| "test-key".to_string())
        });
        assert_eq!(ok.map(|provider| provider.name().to_string()).ok(), Some("gemini".to_string()));
    }

    #[test]
    fn unknown_provider_is_reported() {
        let model = ModelSpec {
            name: "sdxl-1".to_string(),
            provider: "stability".to_string(),
            capabilities: vec!["image".to_string()],
        };
        let err = provider_for_model(&model, &MannequinConfig::default(), |_| None).err();
        assert!(matches!(
            err,
            Some(StartupError::ProviderUnavailable { ref provider, .. }) if provider == "stability"
        ));
    }

    #[test]
    fn error_chain_text_joins_and_dedupes() {
        let err = anyhow::anyhow!("connection reset")
            .context("connection reset")
            .context("Gemini request failed");
        assert_eq!(
            error_chain_text(&err, 200),
            "Gemini request failed | caused by: connection reset"
        );
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }

    #[test]
    fn bad_key_and_missing_model_are_rejections() {
        let invalid_key = r#"{"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT", "details": [{"reason": "API_KEY_INVALID"}]}}"#;
        assert_eq!(
            rejection_for_status("Gemini", 400, invalid_key),
            Some(ProviderRejection::Credentials {
                provider: "Gemini".to_string(),
                status: 400,
                detail: "API key not valid. Please pass a valid API key.".to_string(),
            })
        );
        assert!(matches!(
            rejection_for_status("Gemini", 403, "forbidden"),
            Some(ProviderRejection::Credentials { status: 403, ref detail, .. }) if detail == "forbidden"
        ));
        assert!(matches!(
            rejection_for_status("Gemini", 401, ""),
            Some(ProviderRejection::Credentials { status: 401, .. })
        ));
        assert!(matches!(
            rejection_for_status(
                "Gemini",
                404,
                r#"{"error": {"message": "models/gemini-9 is not found"}}"#
            ),
            Some(ProviderRejection::ModelUnavailable { status: 404, ref detail, .. })
                if detail == "models/gemini-9 is not found"
        ));
    }

    #[test]
    fn transient_statuses_stay_per_angle() {
        let bad_request = r#"{"error": {"code": 400, "message": "Image too large"}}"#;
        assert_eq!(rejection_for_status("Gemini", 400, bad_request), None);
        assert_eq!(rejection_for_status("Gemini", 429, "quota exceeded"), None);
        assert_eq!(rejection_for_status("Gemini", 500, "internal"), None);
        assert_eq!(rejection_for_status("Gemini", 503, "unavailable"), None);
    }
}
