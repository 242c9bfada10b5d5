use clap::Parser;
use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Server configuration, layered flag > env > default (spec §6).
#[derive(Clone)]
pub struct ServerConfig {
    pub listen_address: String,
    pub file_storage_path: String,
    pub store_interval_secs: u64,
    pub restore: bool,
    pub database_dsn: String,
    pub hash_key: String,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen_address", &self.listen_address)
            .field("file_storage_path", &self.file_storage_path)
            .field("store_interval_secs", &self.store_interval_secs)
            .field("restore", &self.restore)
            .field("database_dsn", &redact(&self.database_dsn))
            .field("hash_key", &redact(&self.hash_key))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

#[derive(Debug, Deserialize)]
struct ServerDefaults {
    #[serde(rename = "address")]
    listen_address: String,
    #[serde(rename = "file_storage_path")]
    file_storage_path: String,
    #[serde(rename = "store_interval")]
    store_interval_secs: u64,
    restore: bool,
    #[serde(rename = "database_dsn")]
    database_dsn: String,
    #[serde(rename = "hash_key")]
    hash_key: String,
}

/// Command-line overrides. Every field is optional so an absent flag falls
/// through to the environment/default layer read separately via `config`.
#[derive(Debug, Parser, Default)]
#[command(name = "server")]
struct ServerFlags {
    #[arg(short = 'a', long)]
    address: Option<String>,
    #[arg(short = 'f', long)]
    file_storage_path: Option<String>,
    #[arg(short = 'i', long)]
    store_interval: Option<u64>,
    #[arg(short = 'r', long)]
    restore: Option<bool>,
    #[arg(short = 'd', long)]
    database_dsn: Option<String>,
    #[arg(short = 'k', long)]
    hash_key: Option<String>,
}

impl ServerConfig {
    /// Builds the layered config: `config` crate covers env + defaults,
    /// `clap` parses argv and wins when a flag is actually present.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(std::env::args_os())
    }

    fn from_args(args: impl IntoIterator<Item = std::ffi::OsString>) -> Result<Self, ConfigError> {
        let defaults: ServerDefaults = Config::builder()
            .add_source(Environment::default().try_parsing(true))
            .set_default("address", ":8080")?
            .set_default("file_storage_path", "metrics.json")?
            .set_default("store_interval", 300)?
            .set_default("restore", false)?
            .set_default("database_dsn", "")?
            .set_default("hash_key", "")?
            .build()?
            .try_deserialize()?;

        let flags = ServerFlags::parse_from(args);

        Ok(ServerConfig {
            listen_address: flags.address.unwrap_or(defaults.listen_address),
            file_storage_path: flags.file_storage_path.unwrap_or(defaults.file_storage_path),
            store_interval_secs: flags.store_interval.unwrap_or(defaults.store_interval_secs),
            restore: flags.restore.unwrap_or(defaults.restore),
            database_dsn: flags.database_dsn.unwrap_or(defaults.database_dsn),
            hash_key: flags.hash_key.unwrap_or(defaults.hash_key),
        })
    }

    /// Storage-backend selection (spec §6): SQL if a DSN is set, else file
    /// if a non-default path was configured, else memory.
    pub fn backend(&self) -> StorageBackend {
        if !self.database_dsn.is_empty() {
            StorageBackend::Sql
        } else if self.file_storage_path != "metrics.json" && !self.file_storage_path.is_empty() {
            StorageBackend::File
        } else {
            StorageBackend::Memory
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    File,
    Sql,
}

/// Agent configuration, same flag > env > default layering as the server.
#[derive(Clone)]
pub struct AgentConfig {
    pub server_address: String,
    pub poll_interval_secs: u64,
    pub report_interval_secs: u64,
    pub rate_limit: usize,
    pub hash_key: String,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("server_address", &self.server_address)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("report_interval_secs", &self.report_interval_secs)
            .field("rate_limit", &self.rate_limit)
            .field("hash_key", &redact(&self.hash_key))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct AgentDefaults {
    #[serde(rename = "address")]
    server_address: String,
    #[serde(rename = "poll_interval")]
    poll_interval_secs: u64,
    #[serde(rename = "report_interval")]
    report_interval_secs: u64,
    #[serde(rename = "rate_limit")]
    rate_limit: usize,
    #[serde(rename = "key")]
    hash_key: String,
}

#[derive(Debug, Parser, Default)]
#[command(name = "agent")]
struct AgentFlags {
    #[arg(short = 'a', long)]
    address: Option<String>,
    #[arg(short = 'p', long)]
    poll_interval: Option<u64>,
    #[arg(short = 'r', long)]
    report_interval: Option<u64>,
    #[arg(short = 'l', long)]
    rate_limit: Option<usize>,
    #[arg(short = 'k', long)]
    key: Option<String>,
}

impl AgentConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(std::env::args_os())
    }

    fn from_args(args: impl IntoIterator<Item = std::ffi::OsString>) -> Result<Self, ConfigError> {
        let defaults: AgentDefaults = Config::builder()
            .add_source(Environment::default().try_parsing(true))
            .set_default("address", "http://localhost:8080")?
            .set_default("poll_interval", 2)?
            .set_default("report_interval", 10)?
            .set_default("rate_limit", 1)?
            .set_default("key", "")?
            .build()?
            .try_deserialize()?;

        let flags = AgentFlags::parse_from(args);

        let mut server_address = flags.address.unwrap_or(defaults.server_address);
        if !server_address.contains("://") {
            server_address = format!("http://{server_address}");
        }

        Ok(AgentConfig {
            server_address,
            poll_interval_secs: flags.poll_interval.unwrap_or(defaults.poll_interval_secs),
            report_interval_secs: flags.report_interval.unwrap_or(defaults.report_interval_secs),
            rate_limit: flags.rate_limit.unwrap_or(defaults.rate_limit).max(1),
            hash_key: flags.key.unwrap_or(defaults.hash_key),
        })
    }
}
