//! Context formatting for recommendation prompts.

use crate::vector_store::{Document, ScoredDocument};

/// One film as the summary model sees it: the text, then its metadata as JSON.
pub fn format_document(document: &Document) -> String {
    let metadata = serde_json::to_string(&document.metadata).unwrap_or_default();
    format!("{}\n\nMetadata: {}", document.content, metadata)
}

/// Format retrieved films for a prompt, best first.
pub fn format_context(documents: &[ScoredDocument]) -> String {
    documents
        .iter()
        .map(|d| format_document(&d.document))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format retrieved films for display to the user.
pub fn format_context_for_display(documents: &[ScoredDocument]) -> String {
    documents
        .iter()
        .map(|d| {
            let meta = &d.document.metadata;
            let year = meta
                .release_year
                .map(|y| format!(" ({})", y))
                .unwrap_or_default();
            format!(
                "{}{} (score: {:.2})\n  Streaming: {}",
                meta.title,
                year,
                d.score,
                meta.streaming_summary()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{film, hit};

    #[test]
    fn test_context_carries_text_and_metadata() {
        let docs = vec![
            hit(film("The Lobster", 2015, 119, &["Comedy"], &["Netflix"]), 0.9),
            hit(film("Dogtooth", 2009, 97, &["Drama"], &[]), 0.7),
        ];
        let context = format_context(&docs);
        assert!(context.starts_with("The Lobster: a film.\n\nMetadata: {"));
        assert!(context.contains(r#""Runtime (minutes)":119"#));
        assert!(context.contains("\n\nDogtooth: a film."));

        let display = format_context_for_display(&docs);
        assert!(display.contains("The Lobster (2015) (score: 0.90)"));
        assert!(display.contains("Streaming: Not currently streaming"));
    }

    #[test]
    fn test_empty_context() {
        assert_eq!(format_context(&[]), "");
    }
}
