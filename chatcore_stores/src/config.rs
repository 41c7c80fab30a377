use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Document store connection settings, read from `MONGODB_*` env vars
/// by the process composing this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStoreConfig {
  pub uri: String,
  pub database: String,
  #[serde(default = "default_min_pool_size")]
  pub min_pool_size: u32,
  #[serde(default = "default_max_pool_size")]
  pub max_pool_size: u32,
  #[serde(default = "default_connect_timeout_secs")]
  pub connect_timeout_secs: u64,
}

fn default_min_pool_size() -> u32 {
  1
}

fn default_max_pool_size() -> u32 {
  10
}

fn default_connect_timeout_secs() -> u64 {
  5
}

impl DocumentStoreConfig {
  pub fn connect_timeout(&self) -> Duration {
    Duration::from_secs(self.connect_timeout_secs)
  }
}

/// Relational store connection settings, read from `SQLITE_*` env
/// vars by the process composing this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalStoreConfig {
  pub database_path: String,
  #[serde(default = "default_max_connections")]
  pub max_connections: u32,
  #[serde(default = "default_connect_timeout_secs")]
  pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
  5
}

impl RelationalStoreConfig {
  pub fn connect_timeout(&self) -> Duration {
    Duration::from_secs(self.connect_timeout_secs)
  }
}
