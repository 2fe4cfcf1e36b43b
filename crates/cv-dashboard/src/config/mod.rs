mod settings;

pub use settings::{
    BackendConfig, ConversationConfig, HealthConfig, JobWatchConfig, ServerConfig, Settings,
};
