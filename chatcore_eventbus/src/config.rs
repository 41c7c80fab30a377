use serde::{Deserialize, Serialize};

/// Event bus settings, read from the broker's `REDIS_*`-style env
/// vars by the process composing this crate (the names are inherited
/// from the original deployment's broker choice; the wire contract is
/// "any pub/sub endpoint with topic-string addressing and JSON
/// payloads", satisfied here by a NATS connection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
  pub broker_url: String,
  #[serde(default = "default_local_queue_max_size")]
  pub local_queue_max_size: usize,
  pub local_queue_persistence_file: Option<String>,
  #[serde(default = "default_reconnect_poll_secs")]
  pub reconnect_poll_secs: u64,
}

fn default_local_queue_max_size() -> usize {
  1000
}

fn default_reconnect_poll_secs() -> u64 {
  10
}

impl Default for EventBusConfig {
  fn default() -> Self {
    Self {
      broker_url: "nats://127.0.0.1:4222".to_string(),
      local_queue_max_size: default_local_queue_max_size(),
      local_queue_persistence_file: None,
      reconnect_poll_secs: default_reconnect_poll_secs(),
    }
  }
}
