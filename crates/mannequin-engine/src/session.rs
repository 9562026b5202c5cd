use indexmap::IndexMap;
use mannequin_contracts::angles::AngleSet;
use serde_json::{Map, Value};

use crate::normalize::NormalizationResult;

/// A fully normalized image for one angle.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedVariant {
    pub angle: String,
    pub model: String,
    pub prompt: String,
    pub normalized: NormalizationResult,
    pub provider_request: Map<String, Value>,
    /// Provider-side metadata (finish reasons, token usage).
    pub provider_response: Map<String, Value>,
    pub warnings: Vec<String>,
    pub generated_at: String,
}

/// Per-session state: one slot per angle, in angle order. A slot is either
/// absent or holds a complete variant; writes replace a whole slot.
#[derive(Debug, Clone)]
pub struct VariantSession {
    session_id: String,
    angles: AngleSet,
    slots: IndexMap<String, Option<GeneratedVariant>>,
}

impl VariantSession {
    pub fn new(angles: AngleSet) -> Self {
        Self::with_session_id(angles, format!("session-{}", uuid::Uuid::new_v4()))
    }

    pub fn with_session_id(angles: AngleSet, session_id: impl Into<String>) -> Self {
        let slots = angles
            .iter()
            .map(|angle| (angle.label.clone(), None))
            .collect();
        Self {
            session_id: session_id.into(),
            angles,
            slots,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn angles(&self) -> &AngleSet {
        &self.angles
    }

    pub fn get(&self, label: &str) -> Option<&GeneratedVariant> {
        let angle = self.angles.get(label)?;
        self.slots.get(&angle.label).and_then(Option::as_ref)
    }

    /// Iterates every slot in angle order.
    pub fn slots(&self) -> impl Iterator<Item = (&str, Option<&GeneratedVariant>)> {
        self.slots
            .iter()
            .map(|(label, slot)| (label.as_str(), slot.as_ref()))
    }

    pub fn populated(&self) -> impl Iterator<Item = &GeneratedVariant> {
        self.slots.values().filter_map(Option::as_ref)
    }

    pub fn absent(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.is_none())
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn populated_count(&self) -> usize {
        self.populated().count()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.values().all(Option::is_some)
    }

    /// Replaces the slot for `variant.angle`, returning the previous content.
    /// Variants for angles outside the session are rejected.
    pub(crate) fn store(
        &mut self,
        variant: GeneratedVariant,
    ) -> Result<Option<GeneratedVariant>, GeneratedVariant> {
        let Some(angle) = self.angles.get(&variant.angle) else {
            return Err(variant);
        };
        let label = angle.label.clone();
        match self.slots.get_mut(&label) {
            Some(slot) => Ok(slot.replace(variant)),
            None => Err(variant),
        }
    }

    pub fn clear(&mut self, label: &str) -> Option<GeneratedVariant> {
        let angle = self.angles.get(label)?;
        self.slots.get_mut(&angle.label).and_then(Option::take)
    }
}
