//! Turns one source photo into a set of normalized angle variants.
//!
//! Angles run strictly one after another with a fixed pause between calls.
//! A failure is confined to its own angle: the slot stays as it was and the
//! batch moves on. The exception is a provider rejection (bad key, unknown
//! model), which ends the batch after the first request. Session state is
//! owned by the caller and passed in.

use std::thread;
use std::time::Instant;

use mannequin_contracts::angles::AngleSpec;
use mannequin_contracts::config::{GenerationSettings, MannequinConfig, NormalizeParams};
use mannequin_contracts::events::{
    now_utc_iso, EventPayload, EventWriter, BATCH_FINISHED, SESSION_STARTED, VARIANT_FAILED,
    VARIANT_GENERATED, VARIANT_REQUESTED,
};
use mannequin_contracts::models::{ModelSelector, ModelSpec, EDIT_CAPABILITY};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{FailureKind, NormalizeError, ProviderRejection, StartupError, VariantFailure};
use crate::normalize::normalize_bytes;
use crate::prompt::build_prompt;
use crate::providers::{
    error_chain_text, map_object, provider_for_model, GenerationRequest, ImageProvider,
};
use crate::session::{GeneratedVariant, VariantSession};
use crate::source::SourceImage;

const ERROR_TEXT_LIMIT: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub enum AngleOutcome {
    Generated {
        angle: String,
        quality: u8,
        size_kb: f64,
        within_budget: bool,
    },
    Failed(VariantFailure),
}

impl AngleOutcome {
    pub fn angle(&self) -> &str {
        match self {
            Self::Generated { angle, .. } => angle,
            Self::Failed(failure) => &failure.angle,
        }
    }
}

/// Per-angle outcomes of one batch, in angle order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<AngleOutcome>,
}

impl BatchReport {
    pub fn generated_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, AngleOutcome::Generated { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &VariantFailure> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            AngleOutcome::Failed(failure) => Some(failure),
            AngleOutcome::Generated { .. } => None,
        })
    }

    /// One human-readable line per failed angle.
    pub fn messages(&self) -> Vec<String> {
        self.failures().map(ToString::to_string).collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }
}

pub struct Orchestrator {
    provider: Box<dyn ImageProvider>,
    model: ModelSpec,
    settings: GenerationSettings,
    normalize: NormalizeParams,
    events: EventWriter,
    selection_note: Option<String>,
}

impl Orchestrator {
    pub fn new(
        provider: Box<dyn ImageProvider>,
        model: ModelSpec,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            provider,
            model,
            settings,
            normalize: NormalizeParams::default(),
            events: EventWriter::disabled("unset"),
            selection_note: None,
        }
    }

    pub fn with_normalize(mut self, params: NormalizeParams) -> Self {
        self.normalize = params;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    /// Resolves the configured model and builds its provider. Every fatal
    /// startup problem surfaces here, before any request is sent.
    pub fn from_config(
        config: &MannequinConfig,
        events: EventWriter,
    ) -> Result<Self, StartupError> {
        Self::from_config_with(config, events, |key| std::env::var(key).ok())
    }

    pub fn from_config_with(
        config: &MannequinConfig,
        events: EventWriter,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StartupError> {
        let selection =
            ModelSelector::default().select(config.model.as_deref(), EDIT_CAPABILITY)?;
        if let Some(note) = selection.note.as_deref() {
            info!("{note}");
        }
        let provider = provider_for_model(&selection.model, config, lookup)?;
        let mut orchestrator = Self::new(provider, selection.model, config.generation.clone())
            .with_normalize(config.normalize.clone())
            .with_events(events);
        orchestrator.selection_note = selection.note;
        Ok(orchestrator)
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn selection_note(&self) -> Option<&str> {
        self.selection_note.as_deref()
    }

    pub fn normalize_params(&self) -> &NormalizeParams {
        &self.normalize
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn start_session(&self, session: &VariantSession) {
        self.record(
            SESSION_STARTED,
            map_object(json!({
                "model": self.model.name,
                "provider": self.provider.name(),
                "angles": session.angles().labels(),
                "target_width": self.normalize.target_width,
                "target_height": self.normalize.target_height(),
                "max_kilobytes": self.normalize.max_kilobytes,
            })),
        );
    }

    /// One round trip for one angle. Nothing is stored; the caller decides
    /// where a successful variant goes.
    pub fn generate_variant(
        &self,
        angle: &AngleSpec,
        source: &SourceImage,
    ) -> Result<GeneratedVariant, VariantFailure> {
        let prompt = build_prompt(angle, self.normalize.aspect_ratio);
        self.record(
            VARIANT_REQUESTED,
            map_object(json!({
                "angle": angle.label,
                "model": self.model.name,
                "provider": self.provider.name(),
            })),
        );
        info!(angle = %angle.label, model = %self.model.name, "requesting variant");

        let started = Instant::now();
        let result = self.run_variant(angle, source, &prompt);
        let latency_s = started.elapsed().as_secs_f64();
        match &result {
            Ok(variant) => {
                let normalized = &variant.normalized;
                info!(
                    angle = %angle.label,
                    quality = normalized.quality,
                    size_kb = normalized.size_kb,
                    latency_s,
                    "variant generated"
                );
                self.record(
                    VARIANT_GENERATED,
                    map_object(json!({
                        "angle": angle.label,
                        "width": normalized.width,
                        "height": normalized.height,
                        "quality": normalized.quality,
                        "size_kb": normalized.size_kb,
                        "within_budget": normalized.within_budget(),
                        "attempts": normalized.attempts.len(),
                        "latency_s": latency_s,
                        "warnings": variant.warnings,
                        "provider_response": variant.provider_response,
                    })),
                );
            }
            Err(failure) => self.record_failure(failure),
        }
        result
    }

    fn run_variant(
        &self,
        angle: &AngleSpec,
        source: &SourceImage,
        prompt: &str,
    ) -> Result<GeneratedVariant, VariantFailure> {
        let request = GenerationRequest {
            model: &self.model.name,
            prompt,
            image: source.bytes(),
            mime_type: source.mime_type(),
            settings: &self.settings,
        };
        let response = self
            .provider
            .generate(&request)
            .map_err(|err| classify_provider_error(&angle.label, &err))?;

        let Some(payload) = response.image else {
            let message = match response.text.as_deref().map(str::trim) {
                Some(text) if !text.is_empty() => {
                    format!("response contained no image ({text})")
                }
                _ => "response contained no image".to_string(),
            };
            return Err(VariantFailure::new(
                &angle.label,
                FailureKind::NoImage,
                message,
            ));
        };
        debug!(
            angle = %angle.label,
            bytes = payload.bytes.len(),
            mime_type = payload.mime_type.as_deref().unwrap_or("unknown"),
            "image payload received"
        );

        let normalized = normalize_bytes(&payload.bytes, &self.normalize).map_err(|err| {
            let kind = match err {
                NormalizeError::Decode(_) => FailureKind::Decode,
                _ => FailureKind::Normalize,
            };
            VariantFailure::new(&angle.label, kind, err.to_string())
        })?;
        if !normalized.within_budget() {
            warn!(
                angle = %angle.label,
                size_kb = normalized.size_kb,
                budget_kb = normalized.budget_kb,
                "quality floor reached above the size budget"
            );
        }

        Ok(GeneratedVariant {
            angle: angle.label.clone(),
            model: self.model.name.clone(),
            prompt: prompt.to_string(),
            normalized,
            provider_request: response.provider_request,
            provider_response: response.provider_response,
            warnings: response.warnings,
            generated_at: now_utc_iso(),
        })
    }

    /// Generates every angle of `session` in order, pausing between calls.
    /// Successful angles overwrite their slot; failed ones leave it alone.
    /// A provider rejection stops the loop and is returned as a startup
    /// error; slots filled before it stay filled.
    pub fn generate_batch(
        &self,
        session: &mut VariantSession,
        source: &SourceImage,
    ) -> Result<BatchReport, StartupError> {
        let angles: Vec<AngleSpec> = session.angles().iter().cloned().collect();
        let pause = self.settings.pause();
        let mut report = BatchReport::default();

        for (index, angle) in angles.iter().enumerate() {
            if index > 0 && !pause.is_zero() {
                debug!(pause_ms = self.settings.pause_ms, "pausing before next request");
                thread::sleep(pause);
            }
            let outcome = match self.generate_variant(angle, source) {
                Ok(variant) => self.store(session, variant),
                Err(failure) => match failure.rejection.clone() {
                    Some(rejection) => {
                        report.outcomes.push(AngleOutcome::Failed(failure));
                        self.finish_batch(&report, session, Some(&rejection));
                        return Err(StartupError::Rejected(rejection));
                    }
                    None => AngleOutcome::Failed(failure),
                },
            };
            report.outcomes.push(outcome);
        }

        self.finish_batch(&report, session, None);
        Ok(report)
    }

    fn finish_batch(
        &self,
        report: &BatchReport,
        session: &VariantSession,
        rejection: Option<&ProviderRejection>,
    ) {
        let failed: Vec<String> = report
            .failures()
            .map(|failure| failure.angle.clone())
            .collect();
        info!(
            generated = report.generated_count(),
            failed = failed.len(),
            aborted = rejection.is_some(),
            "batch finished"
        );
        self.record(
            BATCH_FINISHED,
            map_object(json!({
                "generated": report.generated_count(),
                "failed": failed,
                "missing": session.absent(),
                "aborted": rejection.map(ToString::to_string),
            })),
        );
    }

    /// Repeats the call for one angle and overwrites only that slot. On
    /// failure the previous content of the slot is kept.
    pub fn regenerate<'s>(
        &self,
        session: &'s mut VariantSession,
        label: &str,
        source: &SourceImage,
    ) -> Result<&'s GeneratedVariant, VariantFailure> {
        let Some(angle) = session.angles().get(label).cloned() else {
            let failure = VariantFailure::new(
                label,
                FailureKind::UnknownAngle,
                format!(
                    "unknown angle (available: {})",
                    session.angles().labels().join(", ")
                ),
            );
            self.record_failure(&failure);
            return Err(failure);
        };

        let variant = self.generate_variant(&angle, source)?;
        if let AngleOutcome::Failed(failure) = self.store(session, variant) {
            return Err(failure);
        }
        session.get(&angle.label).ok_or_else(|| {
            VariantFailure::new(
                &angle.label,
                FailureKind::UnknownAngle,
                "slot missing after store",
            )
        })
    }

    fn store(&self, session: &mut VariantSession, variant: GeneratedVariant) -> AngleOutcome {
        let angle = variant.angle.clone();
        let quality = variant.normalized.quality;
        let size_kb = variant.normalized.size_kb;
        let within_budget = variant.normalized.within_budget();
        match session.store(variant) {
            Ok(_) => AngleOutcome::Generated {
                angle,
                quality,
                size_kb,
                within_budget,
            },
            Err(_) => AngleOutcome::Failed(VariantFailure::new(
                angle,
                FailureKind::UnknownAngle,
                "angle is not part of this session",
            )),
        }
    }

    fn record_failure(&self, failure: &VariantFailure) {
        warn!(angle = %failure.angle, kind = failure.kind.as_str(), "{failure}");
        self.record(
            VARIANT_FAILED,
            map_object(json!({
                "angle": failure.angle,
                "kind": failure.kind,
                "error": failure.message,
            })),
        );
    }

    // The event log is a side channel; a write failure never fails an angle.
    fn record(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.events.emit(event_type, payload) {
            warn!(event = event_type, error = %err, "event log write failed");
        }
    }
}

fn classify_provider_error(angle: &str, err: &anyhow::Error) -> VariantFailure {
    if let Some(rejection) = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<ProviderRejection>())
    {
        return VariantFailure::rejected(angle, rejection.clone());
    }
    let kind = if err
        .chain()
        .any(|cause| cause.is::<base64::DecodeError>())
    {
        FailureKind::Decode
    } else {
        FailureKind::Request
    };
    VariantFailure::new(angle, kind, error_chain_text(err, ERROR_TEXT_LIMIT))
}
