use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of published content, immutable for the duration of a pipeline
/// run. The structured `body` is kept as raw JSON; flattening happens in
/// `crate::text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub body: Option<Value>,
}

impl ContentItem {
    #[must_use]
    pub fn new(id: impl Into<String>, slug: impl Into<String>, title: impl Into<String>) -> Self {
        let id = id.into();
        debug_assert!(!id.is_empty());
        Self {
            id,
            slug: slug.into(),
            title: title.into(),
            description: String::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_style_helpers_populate_fields() {
        let item = ContentItem::new("id-1", "intro-post", "Intro")
            .with_description("A short description")
            .with_body(json!({ "blocks": [] }));

        assert_eq!(item.slug, "intro-post");
        assert_eq!(item.description, "A short description");
        assert!(item.body.is_some());
    }

    #[test]
    fn deserializes_with_missing_optional_fields() {
        let item: ContentItem =
            serde_json::from_value(json!({ "id": "x", "slug": "s", "title": "T" }))
                .expect("minimal item parses");
        assert_eq!(item.description, "");
        assert!(item.body.is_none());
    }
}
