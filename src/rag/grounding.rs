//! Post-hoc check that a recommendation only names retrieved films.
//!
//! Recommendations are written as `- **Title**:` entries with nested
//! `**Runtime:**`-style detail lines. The check flags; it never rewrites.

use crate::vector_store::ScoredDocument;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Most films a recommendation may name.
pub const MAX_RECOMMENDATIONS: usize = 5;

// Bullet or numbered line opening with a bold span.
static ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*]|\d+\.)\s+\*\*(.+?)\*\*").expect("Invalid regex")
});

static YEAR_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\d{4}\)$").expect("Invalid regex"));

/// Labels of the detail lines under each entry.
const DETAIL_LABELS: [&str; 3] = ["runtime", "release year", "streaming"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroundingReport {
    /// Titles named as recommendations, in answer order.
    pub recommended: Vec<String>,
    /// Recommended titles absent from the retrieved films.
    pub ungrounded: Vec<String>,
    /// More than five films were recommended.
    pub over_limit: bool,
}

impl GroundingReport {
    pub fn is_clean(&self) -> bool {
        self.ungrounded.is_empty() && !self.over_limit
    }
}

/// Titles the answer presents as recommendations.
pub fn recommended_titles(answer: &str) -> Vec<String> {
    ENTRY
        .captures_iter(answer)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            let title = m.as_str().trim().trim_end_matches(':').trim();
            YEAR_SUFFIX.replace(title, "").into_owned()
        })
        .filter(|title| {
            !title.is_empty() && !DETAIL_LABELS.contains(&title.to_lowercase().as_str())
        })
        .collect()
}

/// Compare the answer's recommendations with the retrieved films.
pub fn check(answer: &str, documents: &[ScoredDocument]) -> GroundingReport {
    let known: Vec<String> = documents
        .iter()
        .map(|d| d.document.title().trim().to_lowercase())
        .collect();

    let recommended = recommended_titles(answer);
    let ungrounded = recommended
        .iter()
        .filter(|title| !known.contains(&title.to_lowercase()))
        .cloned()
        .collect();

    GroundingReport {
        over_limit: recommended.len() > MAX_RECOMMENDATIONS,
        recommended,
        ungrounded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{film, hit};

    const ANSWER: &str = "Here are some picks:\n\n\
- **The Lobster**:\n    - **Runtime:** 119 minutes\n    - **Release Year:** 2015\n    - **Streaming:** Netflix\n    - Absurd and tender.\n\
- **Dogtooth (2009)**:\n    - **Runtime:** 97 minutes\n    - **Release Year:** 2009\n    - **Streaming:** Not currently streaming\n    - Deeply odd.\n";

    fn docs() -> Vec<ScoredDocument> {
        vec![
            hit(film("The Lobster", 2015, 119, &["Comedy"], &["Netflix"]), 0.9),
            hit(film("Dogtooth", 2009, 97, &["Drama"], &[]), 0.8),
        ]
    }

    #[test]
    fn test_extracts_titles_not_detail_labels() {
        assert_eq!(recommended_titles(ANSWER), vec!["The Lobster", "Dogtooth"]);
    }

    #[test]
    fn test_titles_with_asterisks_are_checked() {
        let answer = "- **M*A*S*H**:\n    - **Runtime:** 116 minutes\n- **Q*bert: The Movie**: not real\n";
        let documents = vec![hit(film("M*A*S*H", 1970, 116, &["Comedy"], &[]), 0.7)];

        assert_eq!(recommended_titles(answer), vec!["M*A*S*H", "Q*bert: The Movie"]);
        assert_eq!(check(answer, &documents).ungrounded, vec!["Q*bert: The Movie"]);
    }

    #[test]
    fn test_grounded_answer_is_clean() {
        let report = check(ANSWER, &docs());
        assert!(report.is_clean(), "{:?}", report);
    }

    #[test]
    fn test_hallucinated_title_is_flagged() {
        let answer = format!("{}- **Jurassic Park**:\n    - **Runtime:** 127 minutes\n", ANSWER);
        let report = check(&answer, &docs());
        assert_eq!(report.ungrounded, vec!["Jurassic Park"]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_more_than_five_is_flagged() {
        let answer: String = (1..=6).map(|i| format!("{}. **Film {}**: fine\n", i, i)).collect();
        let documents: Vec<_> = (1..=6)
            .map(|i| hit(film(&format!("Film {}", i), 2000, 90, &["Drama"], &[]), 0.5))
            .collect();
        let report = check(&answer, &documents);
        assert!(report.ungrounded.is_empty());
        assert!(report.over_limit);
    }

    #[test]
    fn test_no_matches_message_names_nothing() {
        let report = check(crate::rag::NO_MATCHES, &[]);
        assert!(report.recommended.is_empty());
        assert!(report.is_clean());
    }
}
