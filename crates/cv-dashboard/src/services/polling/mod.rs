//! Polling engine: backoff-driven readiness chains and fixed-interval job
//! status watchers.

mod job_watcher;
mod policy;
mod scheduler;
mod state;

pub use job_watcher::{
    JobOutcome, JobProgress, JobStatusWatcher, WatchConfig, DEFAULT_MAX_CONSECUTIVE_FAILURES,
};
pub use policy::BackoffPolicy;
pub use scheduler::PollingScheduler;
pub use state::{PollOutcome, PollState};
