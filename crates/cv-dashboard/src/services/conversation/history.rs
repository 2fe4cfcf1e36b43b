use crate::models::chat::Turn;

use super::pruning::PruningPolicy;

/// Ordered transcript of one chat session.
///
/// Turns are only appended; the single bulk replacement is the pruning
/// step that runs after every append.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    pruning: PruningPolicy,
}

impl ConversationHistory {
    pub fn new(pruning: PruningPolicy) -> Self {
        Self {
            turns: Vec::new(),
            pruning,
        }
    }

    /// Appends a turn and returns whether the history was pruned.
    pub fn append_turn(&mut self, text: impl Into<String>, is_user: bool) -> bool {
        self.turns.push(Turn::new(text, is_user));

        match self.pruning.apply(&self.turns) {
            Some(pruned) => {
                self.turns = pruned;
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(PruningPolicy::default())
    }
}
