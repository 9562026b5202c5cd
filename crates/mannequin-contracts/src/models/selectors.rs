use thiserror::Error;

use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("model '{0}' is not in the registry")]
    Unknown(String),
    #[error("model '{model}' does not support '{capability}'")]
    MissingCapability { model: String, capability: String },
    #[error("no models available for capability '{0}'")]
    NoneAvailable(String),
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Resolves the model to call. An explicit request never falls back: a
    /// missing or incapable model is a startup error.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, SelectionError> {
        let requested = requested
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(requested_value) = requested {
            let Some(model) = self.registry.get(requested_value) else {
                return Err(SelectionError::Unknown(requested_value.to_string()));
            };
            if !model.supports(capability) {
                return Err(SelectionError::MissingCapability {
                    model: model.name.clone(),
                    capability: capability.to_string(),
                });
            }
            return Ok(ModelSelection {
                model: model.clone(),
                requested: Some(requested_value.to_string()),
                note: None,
            });
        }

        let candidates = self.registry.by_capability(capability);
        let Some(model) = candidates.first().cloned() else {
            return Err(SelectionError::NoneAvailable(capability.to_string()));
        };
        Ok(ModelSelection {
            note: Some(format!("No model specified; using default '{}'.", model.name)),
            model,
            requested: None,
        })
    }
}
