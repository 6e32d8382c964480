use std::num::NonZeroU32;

use axum::http::{Method, header::HeaderName};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

/// Budget for the mutation endpoints (`generate`, `scan`). Read endpoints are
/// not limited.
#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "RateLimitConfig::default_trigger_per_minute")]
    pub trigger_per_minute: NonZeroU32,
    #[serde(default = "RateLimitConfig::default_burst")]
    pub burst: NonZeroU32,
}

impl RateLimitConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_trigger_per_minute() -> NonZeroU32 {
        NonZeroU32::new(6).expect("default trigger bound must be non-zero")
    }

    fn default_burst() -> NonZeroU32 {
        NonZeroU32::new(2).expect("default burst must be non-zero")
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            trigger_per_minute: Self::default_trigger_per_minute(),
            burst: Self::default_burst(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allow_origins: Vec<String>,
    #[serde(default = "CorsConfig::default_allow_methods")]
    pub allow_methods: Vec<String>,
    #[serde(default = "CorsConfig::default_allow_headers")]
    pub allow_headers: Vec<String>,
    #[serde(default = "CorsConfig::default_max_age_secs")]
    pub max_age_secs: u64,
}

impl CorsConfig {
    fn default_allow_methods() -> Vec<String> {
        vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()]
    }

    fn default_allow_headers() -> Vec<String> {
        vec!["authorization".to_string(), "content-type".to_string()]
    }

    fn default_max_age_secs() -> u64 {
        600
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_origins: Vec::new(),
            allow_methods: Self::default_allow_methods(),
            allow_headers: Self::default_allow_headers(),
            max_age_secs: Self::default_max_age_secs(),
        }
    }
}

pub fn parse_method(method: &str) -> Result<Method, String> {
    Method::from_bytes(method.as_bytes())
        .map_err(|_| format!("invalid HTTP method `{method}` in CORS allow_methods"))
}

pub fn parse_header(name: &str) -> Result<HeaderName, String> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| format!("invalid HTTP header `{name}` in CORS configuration"))
}
