pub mod error;
pub mod export;
pub mod normalize;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod session;
pub mod source;

pub use error::{
    FailureKind, NormalizeError, ProviderRejection, SourceImageError, StartupError, VariantFailure,
};
pub use export::{export_session, save_variant, ExportSummary};
pub use normalize::{normalize, normalize_bytes, EncodeAttempt, NormalizationResult};
pub use orchestrator::{AngleOutcome, BatchReport, Orchestrator};
pub use providers::{GenerationRequest, GenerationResponse, ImageProvider, InlineImage};
pub use session::{GeneratedVariant, VariantSession};
pub use source::SourceImage;
