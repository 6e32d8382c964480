//! Flattening of structured CMS bodies into prompt-ready text.

use serde_json::Value;
use tracing::warn;

use crate::constants::MIN_FLATTENED_CHARS;

/// Reduce a structured content body to a single flat string.
///
/// Walks the block tree in document order and concatenates the text found in
/// every block's `title` and `text` properties, separated by blank lines. An
/// absent or malformed body yields an empty string; this function never fails.
pub fn flatten_body(body: Option<&Value>) -> String {
    let Some(value) = body else {
        return String::new();
    };

    if !matches!(value, Value::Object(_) | Value::Array(_)) {
        warn!("content body is neither an object nor an array; treating as empty");
        return String::new();
    }

    let mut segments = Vec::new();
    collect_segments(value, &mut segments);
    segments.join("\n\n")
}

fn collect_segments(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == "title" || key == "text" {
                    if let Some(text) = run_text(child) {
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            out.push(trimmed.to_string());
                        }
                    }
                } else {
                    collect_segments(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_segments(item, out);
            }
        }
        _ => {}
    }
}

/// Extract the text carried by a `title`/`text` property: either a plain
/// string or an array of inline runs each carrying a `text` field.
fn run_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(runs) => {
            let mut buffer = String::new();
            for run in runs {
                match run {
                    Value::String(text) => buffer.push_str(text),
                    Value::Object(map) => {
                        if let Some(Value::String(text)) = map.get("text") {
                            buffer.push_str(text);
                        }
                    }
                    _ => {}
                }
            }
            (!buffer.is_empty()).then_some(buffer)
        }
        _ => None,
    }
}

/// Apply the minimum-length fallback: bodies that flatten to fewer than
/// [`MIN_FLATTENED_CHARS`] characters are replaced by title + description.
pub fn text_or_fallback(flattened: &str, title: &str, description: &str) -> String {
    if flattened.chars().count() >= MIN_FLATTENED_CHARS {
        flattened.to_string()
    } else {
        format!("{title}\n\n{description}")
    }
}

/// Truncate to at most `limit` characters without splitting a code point.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_titles_and_text_in_document_order() {
        let body = json!({
            "blocks": [
                { "title": "Intro", "text": "First paragraph." },
                { "kind": "quote", "text": [ { "text": "Second " }, { "text": "paragraph." } ] },
                { "children": [ { "title": "Nested" } ] }
            ]
        });

        let flat = flatten_body(Some(&body));
        assert_eq!(
            flat,
            "Intro\n\nFirst paragraph.\n\nSecond paragraph.\n\nNested"
        );
    }

    #[test]
    fn malformed_or_absent_bodies_flatten_to_empty() {
        assert_eq!(flatten_body(None), "");
        assert_eq!(flatten_body(Some(&json!("just a string"))), "");
        assert_eq!(flatten_body(Some(&json!(42))), "");
        assert_eq!(flatten_body(Some(&json!({ "media": { "url": "x" } }))), "");
    }

    #[test]
    fn short_bodies_fall_back_to_title_and_description() {
        let fallback = text_or_fallback("too short", "Title", "Description");
        assert_eq!(fallback, "Title\n\nDescription");

        let long = "x".repeat(MIN_FLATTENED_CHARS);
        assert_eq!(text_or_fallback(&long, "Title", "Description"), long);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("żółw idzie", 4), "żółw");
    }
}
