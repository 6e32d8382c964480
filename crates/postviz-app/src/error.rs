//! Application-level error type shared across binaries and services.

use thiserror::Error;

use postviz_server::server::ServerError;

use crate::config::AppConfigError;
use crate::paths::PathError;
use crate::services::orchestrator::PipelineError;
use crate::services::reaper::ReaperError;
use crate::services::records::RecordStoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] AppConfigError),
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error(transparent)]
    Records(#[from] Box<RecordStoreError>),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Reaper(#[from] ReaperError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<RecordStoreError> for AppError {
    fn from(e: RecordStoreError) -> Self {
        AppError::Records(Box::new(e))
    }
}
