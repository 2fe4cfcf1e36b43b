use tracing::{debug, warn};

use crate::models::chat::Turn;

/// Size-triggered history trimming.
///
/// When the serialized history grows past `max_history_bytes`, turns are
/// regrouped in twos from the newest end, and only the oldest group plus
/// the most recent groups survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruningPolicy {
    pub max_history_bytes: usize,
    pub min_messages: usize,
}

impl Default for PruningPolicy {
    fn default() -> Self {
        Self {
            max_history_bytes: 10_000,
            min_messages: 5,
        }
    }
}

impl PruningPolicy {
    pub fn new(max_history_bytes: usize, min_messages: usize) -> Self {
        Self {
            max_history_bytes,
            min_messages,
        }
    }

    /// Byte length of the history as a JSON array of turns.
    pub fn serialized_size(turns: &[Turn]) -> usize {
        match serde_json::to_vec(turns) {
            Ok(bytes) => bytes.len(),
            Err(e) => {
                warn!("Failed to measure conversation history: {}", e);
                0
            }
        }
    }

    /// Number of trailing groups kept after the first one.
    pub fn recent_groups(&self) -> usize {
        (self.min_messages / 2).max(5)
    }

    /// Pruned history, or `None` when it is within budget or cannot shrink.
    pub fn apply(&self, turns: &[Turn]) -> Option<Vec<Turn>> {
        let before = Self::serialized_size(turns);
        if before <= self.max_history_bytes {
            return None;
        }

        // rchunks pairs from the end, so an odd length leaves a single
        // turn as the oldest group.
        let mut groups: Vec<&[Turn]> = turns.rchunks(2).collect();
        groups.reverse();

        let keep = self.recent_groups();
        if groups.len() <= keep + 1 {
            return None;
        }

        let pruned: Vec<Turn> = groups[..1]
            .iter()
            .chain(&groups[groups.len() - keep..])
            .flat_map(|group| group.iter().cloned())
            .collect();

        debug!(
            "Pruned conversation history: {} -> {} turns, {} -> {} bytes",
            turns.len(),
            pruned.len(),
            before,
            Self::serialized_size(&pruned)
        );

        Some(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_history(turns: usize, text_len: usize) -> Vec<Turn> {
        (0..turns)
            .map(|i| Turn::new(format!("{}{}", i, "x".repeat(text_len)), i % 2 == 0))
            .collect()
    }

    #[test]
    fn test_within_budget_is_untouched() {
        let policy = PruningPolicy::default();
        assert!(policy.apply(&long_history(20, 10)).is_none());
    }

    #[test]
    fn test_keeps_first_group_and_five_recent_groups() {
        let policy = PruningPolicy::default();
        let turns = long_history(40, 400);
        assert!(PruningPolicy::serialized_size(&turns) > 10_000);

        let pruned = policy.apply(&turns).unwrap();

        assert_eq!(pruned.len(), 12);
        assert_eq!(pruned[..2], turns[..2]);
        assert_eq!(pruned[2..], turns[30..]);
        assert!(PruningPolicy::serialized_size(&pruned) < PruningPolicy::serialized_size(&turns));
    }

    #[test]
    fn test_odd_length_keeps_single_first_turn() {
        let policy = PruningPolicy::default();
        let turns = long_history(41, 400);

        let pruned = policy.apply(&turns).unwrap();

        assert_eq!(pruned.len(), 11);
        assert_eq!(pruned[0], turns[0]);
        assert_eq!(pruned[1..], turns[31..]);
    }

    #[test]
    fn test_too_few_groups_to_shrink() {
        let policy = PruningPolicy::new(100, 5);
        let turns = long_history(12, 400);

        assert!(policy.apply(&turns).is_none());
    }

    #[test]
    fn test_min_messages_widens_window() {
        let policy = PruningPolicy::new(1000, 20);
        assert_eq!(policy.recent_groups(), 10);

        let turns = long_history(30, 100);
        let pruned = policy.apply(&turns).unwrap();
        assert_eq!(pruned.len(), 22);
    }

    #[test]
    fn test_first_turn_survives_repeated_pruning() {
        let policy = PruningPolicy::new(2_000, 5);

        for pattern in 0u32..64 {
            let mut turns = Vec::new();
            let mut prunes = 0;
            for i in 0..60 {
                let is_user = pattern & (1 << (i % 6)) != 0;
                turns.push(Turn::new(format!("{}{}", i, "x".repeat(100)), is_user));

                if let Some(pruned) = policy.apply(&turns) {
                    assert!(pruned.len() < turns.len());
                    assert_eq!(pruned.first(), turns.first(), "pattern {:06b}", pattern);
                    assert_eq!(pruned.last(), turns.last());
                    turns = pruned;
                    prunes += 1;
                }
            }

            assert!(prunes > 1);
            assert_eq!(turns[0].text(), format!("0{}", "x".repeat(100)));
        }
    }
}
