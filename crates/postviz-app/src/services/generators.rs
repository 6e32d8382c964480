//! Per-kind image generation.
//!
//! Each kind builds its fixed prompt template and issues one image-model
//! request. No retries happen here; retry policy belongs to the orchestrator.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::constants::{PROMPT_SOURCE_CHAR_LIMIT, SUMMARY_CARD_MAX_CHARS};
use crate::pipeline::kinds::ArtifactKind;
use crate::pipeline::prompts::{
    diagram_prompt, illustration_prompt, infographic_prompt, summary_card_prompt, summary_prompt,
};
use crate::services::model::{GeneratedImage, ImageModel, ModelError, TextModel};
use crate::text::truncate_chars;

const SUMMARY_SYSTEM_PROMPT: &str = "You are a copy editor. You reply with a \
    single plain-text sentence and nothing else.";

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("summary model returned an empty sentence")]
    EmptySummary,
}

/// Everything a generator may draw from for one content item.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub body_text: &'a str,
    pub key_points: &'a [String],
}

/// Builds the per-kind prompt and drives the image model.
#[derive(Clone)]
pub struct ArtifactGenerator {
    text_model: Arc<dyn TextModel>,
    image_model: Arc<dyn ImageModel>,
}

impl ArtifactGenerator {
    pub fn new(text_model: Arc<dyn TextModel>, image_model: Arc<dyn ImageModel>) -> Self {
        Self {
            text_model,
            image_model,
        }
    }

    pub async fn generate(
        &self,
        kind: ArtifactKind,
        input: &GenerationInput<'_>,
    ) -> Result<GeneratedImage, GeneratorError> {
        let prompt = match kind {
            ArtifactKind::Infographic => infographic_prompt(input.title, input.key_points),
            ArtifactKind::Illustration => illustration_prompt(input.title, input.description),
            ArtifactKind::SummaryCard => {
                let tldr = self.summarize(input.body_text).await?;
                summary_card_prompt(input.title, &tldr)
            }
            ArtifactKind::Diagram => diagram_prompt(
                input.title,
                truncate_chars(input.body_text, PROMPT_SOURCE_CHAR_LIMIT),
            ),
        };

        debug!(kind = %kind, prompt_chars = prompt.len(), "requesting image generation");
        Ok(self.image_model.generate_image(&prompt).await?)
    }

    /// Compress the body to the one-sentence TL;DR the summary card renders.
    /// The model is instructed but not constrained, so the result is also
    /// hard-capped at the character budget.
    async fn summarize(&self, body_text: &str) -> Result<String, GeneratorError> {
        let source = truncate_chars(body_text, PROMPT_SOURCE_CHAR_LIMIT);
        let raw = self
            .text_model
            .generate_text(SUMMARY_SYSTEM_PROMPT, &summary_prompt(source))
            .await?;

        let line = raw
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        let tldr: String = line.chars().take(SUMMARY_CARD_MAX_CHARS).collect();

        if tldr.is_empty() {
            return Err(GeneratorError::EmptySummary);
        }
        Ok(tldr)
    }
}
