//! Key-point extraction over a content item's body text.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::warn;

use crate::constants::PROMPT_SOURCE_CHAR_LIMIT;
use crate::pipeline::prompts::key_points_prompt;
use crate::services::model::{ModelError, TextModel};
use crate::text::{repair_json, strip_code_fences, truncate_chars};

pub(crate) const KEY_POINT_SYSTEM_PROMPT: &str = "You are an editorial analyst. \
    You reply with a JSON array of short strings and nothing else: no prose, \
    no Markdown, no explanations.";
const RETRY_SUFFIX: &str =
    "\n\nNOTE: The previous reply was not valid JSON. Return only a JSON array of strings.";
const DEFAULT_MAX_ATTEMPTS: u8 = 2;
const MAX_KEY_POINTS: usize = 12;

#[derive(Debug, Error)]
pub enum KeyPointError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("key point response was not valid JSON: {snippet}")]
    Unparseable { snippet: String },
    #[error("key point response contained no usable points")]
    Empty,
}

/// Extracts a bounded list of short claims from body text.
#[derive(Clone)]
pub struct KeyPointExtractor {
    model: Arc<dyn TextModel>,
    max_attempts: u8,
}

impl KeyPointExtractor {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self {
            model,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Ask the text model for key points and parse its reply.
    ///
    /// The body is truncated to the model context budget; a parse failure is
    /// retried once with an explicit correction suffix, then propagated.
    pub async fn extract(&self, body_text: &str) -> Result<Vec<String>, KeyPointError> {
        let source = truncate_chars(body_text, PROMPT_SOURCE_CHAR_LIMIT);
        let base_prompt = key_points_prompt(source);

        let mut attempt = 0;
        let mut last_error: Option<KeyPointError> = None;

        while attempt < self.max_attempts {
            let mut prompt = base_prompt.clone();
            if attempt > 0 {
                prompt.push_str(RETRY_SUFFIX);
            }

            match self
                .model
                .generate_text(KEY_POINT_SYSTEM_PROMPT, &prompt)
                .await
            {
                Ok(raw) => match parse_key_points(&raw) {
                    Ok(points) => return Ok(points),
                    Err(error) => {
                        warn!(attempt, %error, "key point reply failed to parse");
                        last_error = Some(error);
                    }
                },
                Err(error) => {
                    warn!(attempt, %error, "key point model call failed");
                    last_error = Some(error.into());
                }
            }

            attempt += 1;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        Err(last_error.expect("at least one attempt executed"))
    }
}

/// Parse a model reply into key points, tolerating fences and minor JSON
/// defects.
pub fn parse_key_points(raw: &str) -> Result<Vec<String>, KeyPointError> {
    let cleaned = strip_code_fences(raw);

    let parsed: Vec<String> = match serde_json::from_str(&cleaned) {
        Ok(points) => points,
        Err(_) => {
            let repaired = repair_json(&cleaned);
            serde_json::from_str(&repaired).map_err(|_| KeyPointError::Unparseable {
                snippet: snippet_of(raw),
            })?
        }
    };

    let points: Vec<String> = parsed
        .into_iter()
        .map(|point| point.trim().to_string())
        .filter(|point| !point.is_empty())
        .take(MAX_KEY_POINTS)
        .collect();

    if points.is_empty() {
        return Err(KeyPointError::Empty);
    }
    Ok(points)
}

fn snippet_of(raw: &str) -> String {
    truncate_chars(raw.trim(), 120).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedModel {
        replies: Mutex<Vec<Result<String, ModelError>>>,
    }

    impl CannedModel {
        fn new(replies: Vec<Result<String, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl TextModel for CannedModel {
        async fn generate_text(&self, _system: &str, _prompt: &str) -> Result<String, ModelError> {
            self.replies
                .lock()
                .expect("reply queue lock poisoned")
                .remove(0)
        }
    }

    #[test]
    fn parses_fenced_arrays_with_trailing_commas() {
        let raw = "```json\n[\"First point\", \"Second point\",]\n```";
        let points = parse_key_points(raw).expect("parses");
        assert_eq!(points, vec!["First point", "Second point"]);
    }

    #[test]
    fn rejects_non_json_replies() {
        let err = parse_key_points("I could not find any key points.").expect_err("must fail");
        assert!(matches!(err, KeyPointError::Unparseable { .. }));
    }

    #[test]
    fn rejects_arrays_of_blank_strings() {
        let err = parse_key_points("[\"  \", \"\"]").expect_err("must fail");
        assert!(matches!(err, KeyPointError::Empty));
    }

    #[tokio::test]
    async fn retries_once_after_a_parse_failure() {
        let model = CannedModel::new(vec![
            Ok("not json at all".to_string()),
            Ok("[\"A\", \"B\", \"C\"]".to_string()),
        ]);
        let extractor = KeyPointExtractor::new(Arc::new(model));

        let points = extractor.extract("body text").await.expect("second attempt");
        assert_eq!(points, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn propagates_the_last_error_when_attempts_run_out() {
        let model = CannedModel::new(vec![
            Ok("garbage".to_string()),
            Ok("more garbage".to_string()),
        ]);
        let extractor = KeyPointExtractor::new(Arc::new(model));

        let err = extractor.extract("body text").await.expect_err("must fail");
        assert!(matches!(err, KeyPointError::Unparseable { .. }));
    }
}
