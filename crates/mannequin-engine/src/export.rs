use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use mannequin_contracts::config::NormalizeParams;
use mannequin_contracts::events::{now_utc_iso, EventWriter, EXPORT_WRITTEN};
use mannequin_contracts::export::{
    pose_file_name, sanitize_pose_id, write_manifest, ExportManifest, ManifestVariant,
    MANIFEST_FILE_NAME, MANIFEST_SCHEMA_VERSION,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::providers::map_object;
use crate::session::{GeneratedVariant, VariantSession};

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub directory: PathBuf,
    pub manifest_path: PathBuf,
    pub files: Vec<PathBuf>,
    pub missing: Vec<String>,
}

/// Writes one populated slot as `pose_<id>_<Angle>.jpg` under `dir`.
pub fn save_variant(
    session: &VariantSession,
    label: &str,
    pose_id: &str,
    dir: &Path,
) -> Result<PathBuf> {
    let Some(angle) = session.angles().get(label) else {
        bail!(
            "unknown angle '{}' (available: {})",
            label,
            session.angles().labels().join(", ")
        );
    };
    let Some(variant) = session.get(&angle.label) else {
        bail!("no image for angle '{}' yet", angle.label);
    };
    fs::create_dir_all(dir).with_context(|| format!("failed creating {}", dir.display()))?;
    write_variant(variant, pose_id, dir)
}

/// Writes every populated slot plus `manifest.json` into `dir`. Absent
/// angles are listed in the manifest rather than failing the export.
pub fn export_session(
    session: &VariantSession,
    pose_id: &str,
    dir: &Path,
    params: &NormalizeParams,
    events: &EventWriter,
) -> Result<ExportSummary> {
    if session.populated_count() == 0 {
        bail!("nothing to export: no angle has an image yet");
    }
    fs::create_dir_all(dir).with_context(|| format!("failed creating {}", dir.display()))?;

    let pose_id = sanitize_pose_id(pose_id);
    let mut files = Vec::new();
    let mut rows = Vec::new();
    for variant in session.populated() {
        let path = write_variant(variant, &pose_id, dir)?;
        let normalized = &variant.normalized;
        rows.push(ManifestVariant {
            angle: variant.angle.clone(),
            file: pose_file_name(&pose_id, &variant.angle),
            width: normalized.width,
            height: normalized.height,
            size_kb: normalized.size_kb,
            quality: normalized.quality,
            within_budget: normalized.within_budget(),
            sha256: hex::encode(Sha256::digest(&normalized.bytes)),
            prompt: variant.prompt.clone(),
            provider_request: variant.provider_request.clone(),
            warnings: variant.warnings.clone(),
        });
        files.push(path);
    }

    let missing = session.absent();
    let model = session
        .populated()
        .next()
        .map(|variant| variant.model.clone())
        .unwrap_or_default();
    let manifest = ExportManifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        session_id: session.session_id().to_string(),
        pose_id: pose_id.clone(),
        model,
        exported_at: now_utc_iso(),
        target_width: params.target_width,
        target_height: params.target_height(),
        max_kilobytes: params.max_kilobytes,
        variants: rows,
        missing: missing.clone(),
    };
    let manifest_path = dir.join(MANIFEST_FILE_NAME);
    write_manifest(&manifest_path, &manifest)?;

    info!(
        dir = %dir.display(),
        files = files.len(),
        missing = missing.len(),
        "export written"
    );
    events.emit(
        EXPORT_WRITTEN,
        map_object(json!({
            "pose_id": pose_id,
            "dir": dir.display().to_string(),
            "files": files.iter().map(|path| path.display().to_string()).collect::<Vec<_>>(),
            "missing": missing,
        })),
    )?;

    Ok(ExportSummary {
        directory: dir.to_path_buf(),
        manifest_path,
        files,
        missing,
    })
}

fn write_variant(variant: &GeneratedVariant, pose_id: &str, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(pose_file_name(pose_id, &variant.angle));
    fs::write(&path, &variant.normalized.bytes)
        .with_context(|| format!("failed writing {}", path.display()))?;
    Ok(path)
}
