//! Text utilities kept pure for reuse across services and pipelines.
//!
//! Functions and types exposed here must remain side-effect free so they can
//! be composed from orchestrators without introducing hidden IO or mutable
//! state.

pub mod flatten;
pub mod repair;

pub use flatten::{flatten_body, text_or_fallback, truncate_chars};
pub use repair::{repair_json, strip_code_fences};
