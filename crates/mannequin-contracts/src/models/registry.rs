use indexmap::IndexMap;

pub const IMAGE_CAPABILITY: &str = "image";
/// Accepts an input image alongside the prompt.
pub const EDIT_CAPABILITY: &str = "edit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        let trimmed = name.trim();
        self.models
            .get(trimmed)
            .or_else(|| self.models.get(trimmed.trim_start_matches("models/")))
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, capabilities: &[&str]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
            },
        );
    };

    insert(
        "gemini-2.5-flash-image",
        "gemini",
        &[IMAGE_CAPABILITY, EDIT_CAPABILITY],
    );
    insert(
        "gemini-2.5-flash-image-preview",
        "gemini",
        &[IMAGE_CAPABILITY, EDIT_CAPABILITY],
    );
    insert(
        "gemini-3-pro-image-preview",
        "gemini",
        &[IMAGE_CAPABILITY, EDIT_CAPABILITY],
    );
    insert(
        "dryrun-image-1",
        "dryrun",
        &[IMAGE_CAPABILITY, EDIT_CAPABILITY],
    );

    map
}

#[cfg(test)]
mod tests {
    use super::{ModelRegistry, EDIT_CAPABILITY};

    #[test]
    fn every_default_model_can_edit() {
        let registry = ModelRegistry::default();
        let names: Vec<&str> = registry.list().map(|model| model.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "gemini-2.5-flash-image",
                "gemini-2.5-flash-image-preview",
                "gemini-3-pro-image-preview",
                "dryrun-image-1",
            ]
        );
        assert_eq!(registry.by_capability(EDIT_CAPABILITY).len(), names.len());
        assert_eq!(
            registry
                .get("models/dryrun-image-1")
                .map(|model| model.provider.as_str()),
            Some("dryrun")
        );
    }
}
