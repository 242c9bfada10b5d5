mod settings;

pub use settings::{AgentConfig, ServerConfig, StorageBackend};