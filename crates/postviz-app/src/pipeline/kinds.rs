use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString};

/// The four fixed visualization categories.
///
/// Declaration order is the fixed generation order; the derived `Ord` keeps
/// artifact maps iterating in that same order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumString,
    AsRefStr,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "camelCase")]
pub enum ArtifactKind {
    Infographic,
    Illustration,
    SummaryCard,
    Diagram,
}

impl ArtifactKind {
    /// All kinds in generation order.
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Infographic,
        ArtifactKind::Illustration,
        ArtifactKind::SummaryCard,
        ArtifactKind::Diagram,
    ];

    /// Kebab-case form used in storage paths and logs.
    pub fn slug(self) -> &'static str {
        match self {
            ArtifactKind::Infographic => "infographic",
            ArtifactKind::Illustration => "illustration",
            ArtifactKind::SummaryCard => "summary-card",
            ArtifactKind::Diagram => "diagram",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn slugs_round_trip_through_strum() {
        for kind in ArtifactKind::ALL {
            assert_eq!(ArtifactKind::from_str(kind.slug()).expect("parses"), kind);
        }
    }

    #[test]
    fn json_names_use_camel_case() {
        let encoded = serde_json::to_string(&ArtifactKind::SummaryCard).expect("encodes");
        assert_eq!(encoded, "\"summaryCard\"");
    }

    #[test]
    fn ordering_matches_generation_order() {
        let mut sorted = ArtifactKind::ALL;
        sorted.sort();
        assert_eq!(sorted, ArtifactKind::ALL);
    }
}
