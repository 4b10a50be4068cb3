//! CLI configuration.

use std::path::PathBuf;

use clap::Parser;
use docrel_core::config::{
    DEFAULT_LOCK_RETRY_LIMIT, DEFAULT_MAX_CASCADE_DEPTH, DEFAULT_MAX_PROJECTION_DEPTH,
    DEFAULT_PAGE_SIZE,
};
use docrel_core::{EngineConfig, StorageConfig};

use crate::commands::Command;

/// Default page cache size in megabytes.
pub const DEFAULT_CACHE_MB: u64 = 64;

/// Where documents are kept.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Sled database on disk.
    Sled(StorageConfig),
    /// Process memory; gone on exit.
    Memory,
}

/// Resolved CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Document store.
    pub store: StoreConfig,
    /// Engine limits.
    pub engine: EngineConfig,
    /// Caller identity recorded in request spans.
    pub actor: Option<String>,
}

impl CliConfig {
    /// Create a configuration for a sled store at `data_path`.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self::with_storage(StorageConfig::new(data_path))
    }

    /// Create a configuration for a sled store with explicit storage settings.
    pub fn with_storage(storage: StorageConfig) -> Self {
        Self {
            store: StoreConfig::Sled(storage),
            engine: EngineConfig::default(),
            actor: None,
        }
    }

    /// Keep documents in memory instead of on disk.
    pub fn in_memory(mut self) -> Self {
        self.store = StoreConfig::Memory;
        self
    }

    /// Set the engine configuration.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Set the caller identity.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self::new("./docrel_data")
    }
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "docrel")]
#[command(version, about = "Seed, query and audit a docrel store", long_about = None)]
pub struct Args {
    /// Path to the sled data directory.
    #[arg(short, long, default_value = "./docrel_data", global = true)]
    pub data_path: PathBuf,

    /// Use an in-memory store (contents are lost on exit).
    #[arg(long, global = true)]
    pub memory: bool,

    /// Page cache size in megabytes.
    #[arg(long, default_value_t = DEFAULT_CACHE_MB, global = true)]
    pub cache_mb: u64,

    /// Maximum relation hops in a projection.
    #[arg(long, default_value_t = DEFAULT_MAX_PROJECTION_DEPTH, global = true)]
    pub max_projection_depth: u32,

    /// Maximum cascade recursion depth.
    #[arg(long, default_value_t = DEFAULT_MAX_CASCADE_DEPTH, global = true)]
    pub max_cascade_depth: usize,

    /// Locking rounds before a write gives up.
    #[arg(long, default_value_t = DEFAULT_LOCK_RETRY_LIMIT, global = true)]
    pub lock_retries: usize,

    /// Results returned when no limit is given.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, global = true)]
    pub page_size: usize,

    /// Caller identity for request logs.
    #[arg(long, global = true)]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Split into the command to run and the configuration to run it with.
    pub fn into_config(self) -> (CliConfig, Command) {
        let engine = EngineConfig::new()
            .with_max_projection_depth(self.max_projection_depth)
            .with_max_cascade_depth(self.max_cascade_depth)
            .with_lock_retry_limit(self.lock_retries)
            .with_default_page_size(self.page_size);

        let mut config = if self.memory {
            CliConfig::default().in_memory()
        } else {
            CliConfig::with_storage(
                StorageConfig::new(self.data_path)
                    .with_cache_capacity(self.cache_mb * 1024 * 1024)
                    .flush_on_write(),
            )
        }
        .with_engine(engine);
        if let Some(actor) = self.actor {
            config = config.with_actor(actor);
        }
        (config, self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        match &config.store {
            StoreConfig::Sled(storage) => assert_eq!(storage.path, PathBuf::from("./docrel_data")),
            StoreConfig::Memory => panic!("expected sled store"),
        }
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.actor.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = CliConfig::new("/var/lib/docrel")
            .in_memory()
            .with_engine(EngineConfig::new().with_default_page_size(3))
            .with_actor("admin");

        assert!(matches!(config.store, StoreConfig::Memory));
        assert_eq!(config.engine.default_page_size, 3);
        assert_eq!(config.actor.as_deref(), Some("admin"));
    }

    #[test]
    fn test_args_into_config() {
        let args = Args::try_parse_from([
            "docrel",
            "--data-path",
            "/tmp/docrel",
            "--cache-mb",
            "8",
            "--page-size",
            "25",
            "--lock-retries",
            "0",
            "audit",
        ])
        .unwrap();
        let (config, command) = args.into_config();

        assert!(matches!(command, Command::Audit));
        let StoreConfig::Sled(storage) = &config.store else {
            panic!("expected sled store");
        };
        assert_eq!(storage.path, PathBuf::from("/tmp/docrel"));
        assert_eq!(storage.cache_capacity, 8 * 1024 * 1024);
        assert!(storage.flush_on_write);
        assert_eq!(config.engine.default_page_size, 25);
        assert_eq!(config.engine.lock_retry_limit, 1);
    }

    #[test]
    fn test_memory_flag_after_subcommand() {
        let args = Args::try_parse_from(["docrel", "audit", "--memory"]).unwrap();
        let (config, _) = args.into_config();
        assert!(matches!(config.store, StoreConfig::Memory));
    }
}
