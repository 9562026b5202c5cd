use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MANIFEST_SCHEMA_VERSION: u64 = 1;
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Describes one batch export directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub schema_version: u64,
    pub session_id: String,
    pub pose_id: String,
    pub model: String,
    pub exported_at: String,
    pub target_width: u32,
    pub target_height: u32,
    pub max_kilobytes: f64,
    pub variants: Vec<ManifestVariant>,
    /// Angles that had no image at export time, in angle order.
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestVariant {
    pub angle: String,
    pub file: String,
    pub width: u32,
    pub height: u32,
    pub size_kb: f64,
    pub quality: u8,
    pub within_budget: bool,
    pub sha256: String,
    pub prompt: String,
    #[serde(default)]
    pub provider_request: Map<String, Value>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

pub fn write_manifest(path: &Path, manifest: &ExportManifest) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut value = serde_json::to_value(manifest)?;
    if let Some(rows) = value.get_mut("variants").and_then(Value::as_array_mut) {
        for row in rows {
            if let Some(request) = row.get_mut("provider_request") {
                *request = sanitize_payload(request);
            }
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    Ok(())
}

/// Replaces binary payload fields with a marker so manifests never embed
/// base64 image data.
pub fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(
                    lowered.as_str(),
                    "data" | "b64_json" | "image" | "image_bytes" | "key"
                ) {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}

/// Trims the id and replaces anything outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_pose_id(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}

/// `pose_<id>_<AngleTag>.jpg`
pub fn pose_file_name(pose_id: &str, angle_label: &str) -> String {
    format!("pose_{}_{}.jpg", sanitize_pose_id(pose_id), angle_label)
}
