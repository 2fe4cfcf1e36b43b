//! Conversation memory management module
//!
//! Per-session transcripts held in memory, paired into question/answer
//! context for each backend query and pruned by serialized size.

mod cache;
mod context_builder;
mod history;
pub mod manager;
mod pairs;
mod pruning;
pub mod types;

pub use cache::{CacheStats, ConversationCache, SessionHandle};
pub use context_builder::{ContextWindow, ContextWindowBuilder, MAX_CONTEXT_PAIRS};
pub use history::ConversationHistory;
pub use manager::{ChatReply, ConversationError, ConversationManager};
pub use pairs::PairBuilder;
pub use pruning::PruningPolicy;
pub use types::{ConversationMetadata, ConversationState};
