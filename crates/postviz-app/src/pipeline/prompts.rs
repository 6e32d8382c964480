//! Prompt construction for key points, summaries, and the four image kinds.
//!
//! These helpers stay pure and only assemble instruction text; model calls
//! and truncation policy live in `crate::services`.

use crate::constants::SUMMARY_CARD_MAX_CHARS;

/// Build the key-point extraction prompt over the prepared body text.
pub fn key_points_prompt(body_text: &str) -> String {
    format!(
        "Read the article below and distill it into 5-7 short key points. \
        Each point is a single self-contained claim of at most 12 words. \
        Do not include URLs, calls to action, or brand and product names. \
        Respond with a JSON array of strings and nothing else.\n\n\
        Article:\n```text\n{body_text}\n```"
    )
}

/// Build the TL;DR compression prompt used by the summary card.
pub fn summary_prompt(body_text: &str) -> String {
    format!(
        "Summarize the article below in exactly one sentence of at most \
        {SUMMARY_CARD_MAX_CHARS} characters. Plain text only, no quotes, no \
        trailing punctuation beyond a single period.\n\n\
        Article:\n```text\n{body_text}\n```"
    )
}

/// Dense multi-point infographic, vertical layout.
pub fn infographic_prompt(title: &str, key_points: &[String]) -> String {
    let points = key_points
        .iter()
        .map(|point| format!("- {point}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Create a clean vertical infographic (portrait, 9:16) titled \
        \"{title}\". Stack one section per key point from top to bottom, each \
        with a simple flat icon and a short label. Dense but readable layout, \
        modern flat design, light background, dark legible text, no \
        watermarks, no photographic elements.\n\nKey points:\n{points}"
    )
}

/// Sparse friendly illustration, square layout.
pub fn illustration_prompt(title: &str, description: &str) -> String {
    format!(
        "Create a friendly square editorial illustration for an article \
        titled \"{title}\". A single playful mascot character interacts with \
        one central visual metaphor for the topic. Sparse composition with \
        generous whitespace, soft rounded shapes, flat colors, no text \
        anywhere in the image.\n\nTopic: {description}"
    )
}

/// Horizontal summary card built around a one-sentence TL;DR.
pub fn summary_card_prompt(title: &str, tldr: &str) -> String {
    format!(
        "Create a wide horizontal summary card (landscape, 16:9) for an \
        article titled \"{title}\". Render the sentence below as the single \
        prominent text element, centered, in a large clean sans-serif \
        typeface on a subtle gradient background. No other text, no logos.\n\n\
        Sentence: {tldr}"
    )
}

/// Flowchart/architecture diagram, horizontal layout.
pub fn diagram_prompt(title: &str, body_text: &str) -> String {
    format!(
        "Create a wide horizontal technical diagram (landscape) explaining \
        the process or architecture described in the article \"{title}\". \
        Use labeled boxes connected by arrows, left to right flow, at most \
        seven nodes, flat monochrome accent palette on a white background, \
        crisp legible labels.\n\nArticle:\n```text\n{body_text}\n```"
    )
}
