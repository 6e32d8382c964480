//! Orchestration layer for IO-bound pipeline services.
//!
//! Modules exposed here coordinate external systems (models, storage, rate
//! limiting) and must avoid embedding pure transforms. Keep stateless helpers
//! in `crate::text` or `crate::pipeline` so concurrency and resource
//! accounting stay localized.

pub mod artifacts;
pub mod context;
pub mod generators;
pub mod keypoints;
pub mod model;
pub mod orchestrator;
pub mod reaper;
pub mod records;

pub use artifacts::{
    ArtifactStore, ArtifactStoreError, FsArtifactStore, StoredArtifact, artifact_path,
    extension_for,
};
pub use context::{GenericRateLimiter, Governors, build_orchestrator};
pub use generators::{ArtifactGenerator, GenerationInput, GeneratorError};
pub use keypoints::{KeyPointError, KeyPointExtractor, parse_key_points};
pub use model::{GeminiClient, GeneratedImage, ImageModel, ModelError, ModelRateLimiter, TextModel};
pub use orchestrator::{
    BatchItemError, BatchReport, CleanupReport, GenerationOrchestrator, KindOutcome, Outcome,
    PipelineError, RunReport, cleanup_record, needs_generation,
};
pub use reaper::{ReaperConfig, ReaperError, ReaperReport, reap_stuck_records};
pub use records::{
    Artifact, GenerationRecord, GenerationRecordStore, ImageEncoding, RecordStatus,
    RecordStoreError,
};

pub use postviz_server::provider::{GenerationProvider, ProviderError, RegenerationMode};
