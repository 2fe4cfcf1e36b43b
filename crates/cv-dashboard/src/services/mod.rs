pub mod backend;
pub mod conversation;
pub mod event_bus;
pub mod health_monitor;
pub mod job_watch;
pub mod polling;

pub use backend::BackendClient;
pub use conversation::ConversationManager;
pub use event_bus::EventBus;
pub use health_monitor::HealthMonitor;
pub use job_watch::JobWatchRegistry;
