//! Cross-cutting application constants.

/// Default Gemini model used for key points and summary compression.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

/// Default Gemini model used for image generation.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// Flattened body text shorter than this falls back to title + description.
pub const MIN_FLATTENED_CHARS: usize = 100;

/// Maximum number of body characters forwarded to a model prompt.
pub const PROMPT_SOURCE_CHAR_LIMIT: usize = 8000;

/// Upper bound on the one-sentence summary rendered on the summary card.
pub const SUMMARY_CARD_MAX_CHARS: usize = 100;

/// Artifact storage namespace prefix shared by all uploads.
pub const ARTIFACT_NAMESPACE: &str = "visualizations";
