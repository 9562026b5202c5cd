use mannequin_contracts::config::ConfigError;
use mannequin_contracts::models::SelectionError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error(transparent)]
    InvalidParameter(#[from] ConfigError),
    #[error("image decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("JPEG encode at quality {quality} failed: {source}")]
    Encode {
        quality: u8,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Error)]
pub enum SourceImageError {
    #[error("unsupported source format {0}; expected JPEG or PNG")]
    UnsupportedFormat(String),
    #[error("source image could not be read: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Problems that stop a session before any generation starts.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{0} not set")]
    MissingCredentials(String),
    #[error("image model unavailable: {0}")]
    ModelUnavailable(#[from] SelectionError),
    #[error("no provider registered for '{provider}' (model '{model}')")]
    ProviderUnavailable { provider: String, model: String },
    #[error("HTTP client setup failed: {0}")]
    Client(#[source] reqwest::Error),
    #[error(transparent)]
    Rejected(#[from] ProviderRejection),
}

/// Provider answers that would fail every angle the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderRejection {
    #[error("{provider} rejected the API key ({status}): {detail}")]
    Credentials {
        provider: String,
        status: u16,
        detail: String,
    },
    #[error("{provider} does not serve the requested model ({status}): {detail}")]
    ModelUnavailable {
        provider: String,
        status: u16,
        detail: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The external call itself failed.
    Request,
    /// The call returned without an image payload.
    NoImage,
    /// The payload was not a decodable image.
    Decode,
    /// Decoded fine but could not be normalized.
    Normalize,
    UnknownAngle,
    /// The provider refused the credentials or the model.
    Rejected,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::NoImage => "no_image",
            Self::Decode => "decode",
            Self::Normalize => "normalize",
            Self::UnknownAngle => "unknown_angle",
            Self::Rejected => "rejected",
        }
    }
}

/// A per-angle failure. Only a provider rejection aborts the rest of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{angle} failed: {message}")]
pub struct VariantFailure {
    pub angle: String,
    pub kind: FailureKind,
    pub message: String,
    #[source]
    pub rejection: Option<ProviderRejection>,
}

impl VariantFailure {
    pub fn new(angle: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            angle: angle.into(),
            kind,
            message: message.into(),
            rejection: None,
        }
    }

    pub fn rejected(angle: impl Into<String>, rejection: ProviderRejection) -> Self {
        Self {
            angle: angle.into(),
            kind: FailureKind::Rejected,
            message: rejection.to_string(),
            rejection: Some(rejection),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.rejection.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::{FailureKind, ProviderRejection, StartupError, VariantFailure};

    #[test]
    fn variant_failure_display_names_the_angle() {
        let failure = VariantFailure::new("Low", FailureKind::NoImage, "no image returned");
        assert_eq!(failure.to_string(), "Low failed: no image returned");
        assert!(failure.source().is_none());
        assert!(!failure.is_fatal());
    }

    #[test]
    fn rejected_failure_keeps_the_provider_answer() {
        let rejection = ProviderRejection::Credentials {
            provider: "Gemini".to_string(),
            status: 400,
            detail: "API key not valid.".to_string(),
        };
        let failure = VariantFailure::rejected("Front", rejection.clone());
        assert!(failure.is_fatal());
        assert_eq!(failure.kind.as_str(), "rejected");
        assert_eq!(
            failure.to_string(),
            "Front failed: Gemini rejected the API key (400): API key not valid."
        );
        assert_eq!(
            failure.source().map(|source| source.to_string()),
            Some(rejection.to_string())
        );
        assert_eq!(
            StartupError::from(rejection).to_string(),
            "Gemini rejected the API key (400): API key not valid."
        );
    }
}
