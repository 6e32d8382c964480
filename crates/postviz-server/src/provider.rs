//! The seam between the HTTP surface and the pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// How a trigger treats previously recorded artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegenerationMode {
    /// Discard recorded artifacts and rebuild every kind.
    Regenerate,
    /// Keep recorded artifacts and only generate absent kinds.
    FillMissing,
}

impl RegenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RegenerationMode::Regenerate => "regenerate",
            RegenerationMode::FillMissing => "fill-missing",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

/// Operations the server exposes over the pipeline. Reports and records are
/// passed as JSON values so the HTTP crate stays independent of pipeline
/// types.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Read-only record lookup; `None` maps to 404.
    async fn record_by_slug(&self, slug: &str) -> Result<Option<Value>, ProviderError>;

    /// Run the pipeline for one slug and return the run report.
    async fn generate(&self, slug: &str, mode: RegenerationMode) -> Result<Value, ProviderError>;

    /// Scan for items missing artifacts and process them; returns the batch
    /// report.
    async fn scan(
        &self,
        mode: RegenerationMode,
        limit: Option<usize>,
    ) -> Result<Value, ProviderError>;
}
