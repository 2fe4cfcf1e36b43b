use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::System;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::chat::SessionId;

use super::types::ConversationState;

/// Shared handle to one session. Holding its lock serializes the
/// session's exchanges.
pub type SessionHandle = Arc<Mutex<ConversationState>>;

struct CacheEntry {
    state: SessionHandle,
    last_activity: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_activity.elapsed() > ttl
    }
}

/// Thread-safe in-memory session cache with idle expiry
#[derive(Clone)]
pub struct ConversationCache {
    storage: Arc<DashMap<SessionId, CacheEntry>>,
    ttl: Duration,
    /// New sessions are refused above this RAM usage (>= 100 disables the check)
    memory_limit_percent: f64,
    system: Arc<parking_lot::Mutex<System>>,
}

impl ConversationCache {
    pub fn new(ttl: Duration, memory_limit_percent: f64) -> Self {
        info!(
            "Initializing conversation cache (idle ttl {:?}, memory limit {:.0}%)",
            ttl, memory_limit_percent
        );
        Self {
            storage: Arc::new(DashMap::new()),
            ttl,
            memory_limit_percent,
            system: Arc::new(parking_lot::Mutex::new(System::new())),
        }
    }

    /// Returns the session and refreshes its activity time.
    /// Expired sessions are removed and reported as missing.
    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        let mut entry = self.storage.get_mut(session_id)?;

        if entry.is_expired(self.ttl) {
            drop(entry);
            self.storage.remove(session_id);
            debug!("Session {} expired, removed from cache", session_id);
            return None;
        }

        entry.last_activity = Instant::now();
        Some(entry.state.clone())
    }

    /// Returns the live session under `session_id`, or stores the one built
    /// by `create`. `None` when a new session would be needed but memory is
    /// above the limit.
    pub fn get_or_insert_with<F>(&self, session_id: &str, create: F) -> Option<SessionHandle>
    where
        F: FnOnce() -> ConversationState,
    {
        if let Some(handle) = self.get(session_id) {
            return Some(handle);
        }

        if !self.can_create_new_session() {
            return None;
        }

        let entry = self
            .storage
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("Created session {}", session_id);
                CacheEntry {
                    state: Arc::new(Mutex::new(create())),
                    last_activity: Instant::now(),
                }
            });
        Some(entry.state.clone())
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.storage.remove(session_id).map(|(_, entry)| entry.state)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn can_create_new_session(&self) -> bool {
        if self.memory_limit_percent >= 100.0 {
            return true;
        }

        let mut sys = self.system.lock();
        sys.refresh_memory();

        let total_memory = sys.total_memory();
        if total_memory == 0 {
            return true;
        }
        let used_memory = sys.used_memory();
        let usage_percent = (used_memory as f64 / total_memory as f64) * 100.0;

        if usage_percent >= self.memory_limit_percent {
            warn!(
                "Memory usage at {:.2}% (used: {} MB, total: {} MB), rejecting new session",
                usage_percent,
                used_memory / 1024 / 1024,
                total_memory / 1024 / 1024
            );
            return false;
        }

        true
    }

    /// Drops idle sessions. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let start_len = self.storage.len();
        self.storage.retain(|_, entry| !entry.is_expired(self.ttl));
        let count = start_len.saturating_sub(self.storage.len());

        if count > 0 {
            info!("Cleaned up {} expired sessions", count);
        }

        count
    }

    pub fn stats(&self) -> CacheStats {
        let mut sys = self.system.lock();
        sys.refresh_memory();

        let total = sys.total_memory();
        let used = sys.used_memory();

        CacheStats {
            active_sessions: self.len(),
            memory_usage_mb: used / 1024 / 1024,
            memory_total_mb: total / 1024 / 1024,
            memory_usage_percent: if total == 0 {
                0.0
            } else {
                (used as f64 / total as f64) * 100.0
            },
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub active_sessions: usize,
    pub memory_usage_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f64,
}
