use crate::models::chat::{QaPair, Turn};

/// Groups a transcript into question/answer pairs.
pub struct PairBuilder;

impl PairBuilder {
    /// Complete pairs in chronological order.
    ///
    /// Scans from the newest turn backward. An assistant turn is held until
    /// the user turn before it is reached, so every answer is matched with
    /// the nearest question preceding it. User turns with nothing held
    /// (unanswered, or followed by another user turn) are dropped, and so is
    /// any assistant turn that no user turn precedes.
    pub fn build_pairs(turns: &[Turn]) -> Vec<QaPair> {
        let mut pairs = Vec::with_capacity(turns.len() / 2);
        let mut pending_answer: Option<&str> = None;

        for turn in turns.iter().rev() {
            if turn.is_user() {
                if let Some(answer) = pending_answer.take() {
                    pairs.push(QaPair::answered(turn.text(), answer));
                }
            } else {
                // Of consecutive assistant turns, the earliest one answers.
                pending_answer = Some(turn.text());
            }
        }

        pairs.reverse();
        pairs
    }
}
