//! Headless CMS adapter.
//!
//! The pipeline treats the CMS as an opaque source of content items; this
//! module owns the REST client and the boundary types. Clients are constructed
//! explicitly from configuration so their lifecycle is owned by the caller.

pub mod client;
pub mod types;

pub use client::{CmsError, ContentSource, RestContentClient};
pub use types::ContentItem;
