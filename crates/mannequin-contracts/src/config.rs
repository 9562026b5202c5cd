use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::angles::{AngleSet, AngleSetError};

pub const MODEL_ENV: &str = "MANNEQUIN_IMAGE_MODEL";
pub const API_BASE_ENV: &str = "GEMINI_API_BASE";

/// Highest JPEG quality the normalizer starts from.
pub const MAX_QUALITY: u8 = 95;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error(transparent)]
    Angles(#[from] AngleSetError),
}

/// Output geometry and size budget for the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeParams {
    pub target_width: u32,
    /// Height over width.
    pub aspect_ratio: f64,
    pub max_kilobytes: f64,
    pub quality_floor: u8,
    pub quality_step: u8,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            target_width: 1000,
            aspect_ratio: 1.5,
            max_kilobytes: 300.0,
            quality_floor: 10,
            quality_step: 5,
        }
    }
}

impl NormalizeParams {
    pub fn target_height(&self) -> u32 {
        (f64::from(self.target_width) * self.aspect_ratio).round() as u32
    }

    /// Upper bound on encode passes: `ceil((95 - floor) / step) + 1`.
    pub fn max_attempts(&self) -> usize {
        let span = usize::from(MAX_QUALITY.saturating_sub(self.quality_floor));
        let step = usize::from(self.quality_step.max(1));
        span.div_ceil(step) + 1
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_width == 0 {
            return Err(invalid("target_width", "must be greater than 0"));
        }
        if !self.aspect_ratio.is_finite() || self.aspect_ratio <= 0.0 {
            return Err(invalid("aspect_ratio", "must be a positive number"));
        }
        let height = f64::from(self.target_width) * self.aspect_ratio;
        if height.round() < 1.0 || height.round() > f64::from(u32::MAX) {
            return Err(invalid(
                "aspect_ratio",
                format!("target height {height:.1} is out of range"),
            ));
        }
        if !self.max_kilobytes.is_finite() || self.max_kilobytes <= 0.0 {
            return Err(invalid("max_kilobytes", "must be a positive number"));
        }
        if self.quality_floor == 0 || self.quality_floor > MAX_QUALITY {
            return Err(invalid(
                "quality_floor",
                format!("must be within 1..={MAX_QUALITY}"),
            ));
        }
        if self.quality_step == 0 {
            return Err(invalid("quality_step", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Knobs for the external generation call and the batch loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub temperature: f64,
    pub top_p: f64,
    /// Fixed pause between consecutive angle requests.
    pub pause_ms: u64,
    /// `None` leaves the HTTP client's default in place.
    pub request_timeout_s: Option<f64>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            top_p: 0.9,
            pause_ms: 1000,
            request_timeout_s: None,
        }
    }
}

impl GenerationSettings {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_s
            .filter(|value| value.is_finite() && *value > 0.0)
            .map(Duration::from_secs_f64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("temperature", "must be within 0.0..=2.0"));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(invalid("top_p", "must be within 0.0..=1.0"));
        }
        if let Some(timeout) = self.request_timeout_s {
            if !timeout.is_finite() || timeout <= 0.0 {
                return Err(invalid("request_timeout_s", "must be a positive number"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MannequinConfig {
    pub model: Option<String>,
    pub api_base: Option<String>,
    pub angles: AngleSet,
    pub normalize: NormalizeParams,
    pub generation: GenerationSettings,
}

impl MannequinConfig {
    /// Reads the optional JSON file, applies environment overrides and
    /// validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_json_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(model) = non_empty(MODEL_ENV) {
            self.model = Some(model);
        }
        if let Some(base) = non_empty(API_BASE_ENV) {
            self.api_base = Some(base.trim_end_matches('/').to_string());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.normalize.validate()?;
        self.generation.validate()?;
        Ok(())
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}
