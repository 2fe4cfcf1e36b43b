use chrono::{DateTime, Utc};

use crate::models::chat::SessionId;

use super::history::ConversationHistory;
use super::pruning::PruningPolicy;

/// Complete conversation state stored in the session cache
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub session_id: SessionId,

    /// Transcript, pruned in place as it grows
    pub history: ConversationHistory,

    pub created_at: DateTime<Utc>,

    pub metadata: ConversationMetadata,
}

impl ConversationState {
    pub fn new(session_id: SessionId, pruning: PruningPolicy) -> Self {
        Self {
            session_id,
            history: ConversationHistory::new(pruning),
            created_at: Utc::now(),
            metadata: ConversationMetadata::default(),
        }
    }

    /// Appends a turn, counting it and any pruning it caused.
    pub fn record_turn(&mut self, text: impl Into<String>, is_user: bool) {
        self.metadata.total_messages += 1;
        if self.history.append_turn(text, is_user) {
            self.metadata.prune_count += 1;
        }
    }
}

/// Per-session counters for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationMetadata {
    /// Turns recorded, including ones later pruned
    pub total_messages: usize,

    /// Queries forwarded to the backend
    pub total_queries: usize,

    pub failed_queries: usize,

    /// Times the history was trimmed
    pub prune_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_turn_counts_prunes() {
        let mut state = ConversationState::new("s1".into(), PruningPolicy::new(500, 5));

        for i in 0..20 {
            state.record_turn(format!("message {} {}", i, "z".repeat(60)), i % 2 == 0);
        }

        assert_eq!(state.metadata.total_messages, 20);
        assert!(state.metadata.prune_count > 0);
        assert!(state.history.len() < 20);
    }
}
