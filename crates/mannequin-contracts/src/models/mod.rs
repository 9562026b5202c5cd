mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec, EDIT_CAPABILITY, IMAGE_CAPABILITY};
pub use selectors::{ModelSelection, ModelSelector, SelectionError};
