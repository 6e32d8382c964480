//! Configuration loading and XDG path helpers.

use std::num::NonZeroU32;
use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use postviz_server::config::ServerConfig;

use crate::constants::{DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};

const CONFIG_FILE: &str = "config/settings";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub cms: CmsConfig,
    pub models: ModelsConfig,
    pub generation: GenerationConfig,
    pub artifacts: ArtifactsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CmsConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    pub text: String,
    pub image: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Token-bucket budget for outbound model calls.
    pub model_calls_per_minute: NonZeroU32,
    /// Pacing between items in batch mode.
    pub items_per_minute: NonZeroU32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactsConfig {
    /// Public base URL under which stored artifacts are served.
    pub public_base_url: String,
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let default_storage = default_storage_path()?;
    let builder = Config::builder()
        .set_default("server.listen_addr", "127.0.0.1:8080")?
        .set_default(
            "storage.path",
            default_storage.to_string_lossy().to_string(),
        )?
        .set_default("cms.base_url", "http://localhost:3000/")?
        .set_default("models.text", DEFAULT_TEXT_MODEL)?
        .set_default("models.image", DEFAULT_IMAGE_MODEL)?
        .set_default("generation.model_calls_per_minute", 4_i64)?
        .set_default("generation.items_per_minute", 30_i64)?
        .set_default(
            "artifacts.public_base_url",
            "http://127.0.0.1:8080/artifacts",
        )?
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(Environment::with_prefix("POSTVIZ").separator("__"));

    let cfg = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("dev", "postviz", "postviz").ok_or(AppConfigError::MissingProjectDirs)
}

fn default_storage_path() -> Result<PathBuf, AppConfigError> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}
