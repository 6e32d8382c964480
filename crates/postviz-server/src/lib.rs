//! HTTP trigger surface for the postviz generation pipeline.
//!
//! The app crate implements [`provider::GenerationProvider`] and hands it to
//! [`server::serve`]; everything HTTP-shaped (routing, rate limiting, CORS,
//! graceful shutdown) lives here.

pub mod config;
pub mod provider;
pub mod server;

pub use config::{CorsConfig, RateLimitConfig, ServerConfig};
pub use provider::{GenerationProvider, ProviderError, RegenerationMode};
pub use server::{ServerError, build_api_router, serve};
