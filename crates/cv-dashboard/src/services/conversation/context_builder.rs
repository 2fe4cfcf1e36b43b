use crate::models::chat::QaPair;

/// Number of most recent complete pairs sent along with a query.
pub const MAX_CONTEXT_PAIRS: usize = 5;

/// Rendered conversation context for one query. Recomputed per query and
/// never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextWindow {
    pub text: String,
    pub pair_count: usize,
}

pub struct ContextWindowBuilder;

impl ContextWindowBuilder {
    pub fn build(pairs: &[QaPair]) -> ContextWindow {
        let complete: Vec<(&str, &str)> = pairs
            .iter()
            .filter_map(|pair| pair.assistant.as_deref().map(|a| (pair.user.as_str(), a)))
            .collect();

        let recent = &complete[complete.len().saturating_sub(MAX_CONTEXT_PAIRS)..];
        let text = recent
            .iter()
            .map(|(user, assistant)| format!("User: {}\nAssistant: {}", user, assistant))
            .collect::<Vec<_>>()
            .join("\n\n");

        ContextWindow {
            text,
            pair_count: recent.len(),
        }
    }

    /// `User:`/`Assistant:` transcript of the most recent pairs, oldest
    /// first. Empty when there is no complete pair.
    pub fn format_context(pairs: &[QaPair]) -> String {
        Self::build(pairs).text
    }
}
