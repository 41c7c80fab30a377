use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_nats::Client;
use chatcore_core::error::CoreError;
use chatcore_core::event::Event;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::EventBusConfig;
use crate::handler::{Handler, Subscription};
use crate::local_queue::LocalQueue;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(3);

/// Publish/subscribe layer over an external broker with a persistent
/// local-queue fallback. `connect` never fails the caller: a broker
/// that cannot be reached leaves the bus in a `degraded` state and
/// publishes accumulate in the local queue until a background task
/// notices the broker is back and drains them.
pub struct EventBus {
  inner: Arc<EventBusInner>,
}

struct EventBusInner {
  config: EventBusConfig,
  client: RwLock<Option<Client>>,
  degraded: AtomicBool,
  local_queue: Mutex<LocalQueue>,
  subscriptions: DashMap<String, Vec<Subscription>>,
  warnings: broadcast::Sender<Event>,
}

impl EventBus {
  pub fn new(config: EventBusConfig) -> Self {
    let persistence_file = config.local_queue_persistence_file.as_ref().map(PathBuf::from);
    let mut local_queue = LocalQueue::new(config.local_queue_max_size, persistence_file);
    local_queue.restore();
    let (warnings, _) = broadcast::channel(128);

    Self {
      inner: Arc::new(EventBusInner {
        config,
        client: RwLock::new(None),
        degraded: AtomicBool::new(true),
        local_queue: Mutex::new(local_queue),
        subscriptions: DashMap::new(),
        warnings,
      }),
    }
  }

  pub fn is_degraded(&self) -> bool {
    self.inner.degraded.load(Ordering::SeqCst)
  }

  /// Number of events currently sitting in the local fallback queue,
  /// for an operator-visible readiness surface.
  pub async fn queued_len(&self) -> usize {
    self.inner.local_queue.lock().await.len()
  }

  /// Subscribe to the bus's internal `queue_overflow`/`buffer_overflow`
  /// style warnings, for an operator-visible readiness surface.
  pub fn warnings(&self) -> broadcast::Receiver<Event> {
    self.inner.warnings.subscribe()
  }

  /// Attempts a single broker connection. Always returns `Ok` — a
  /// failed attempt marks the bus degraded rather than propagating,
  /// since the system must remain live without a broker.
  pub async fn connect(&self) -> Result<(), CoreError> {
    match async_nats::connect(&self.inner.config.broker_url).await {
      Ok(client) => {
        info!(broker = %self.inner.config.broker_url, "event bus connected");
        *self.inner.client.write().await = Some(client);
        self.inner.degraded.store(false, Ordering::SeqCst);
        self.resubscribe_all().await;
      }
      Err(e) => {
        warn!(broker = %self.inner.config.broker_url, error = %e, "event bus broker unreachable, running degraded");
        self.inner.degraded.store(true, Ordering::SeqCst);
      }
    }
    Ok(())
  }

  /// Spawns the background reconnect-and-drain loop. Call once after
  /// the first `connect()`.
  pub fn spawn_background_tasks(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
    let bus = self.clone();
    tokio::spawn(async move {
      let poll_interval = Duration::from_secs(bus.inner.config.reconnect_poll_secs);
      loop {
        tokio::time::sleep(poll_interval).await;
        if bus.is_degraded() {
          debug!("attempting event bus reconnect");
          if bus.connect().await.is_ok() && !bus.is_degraded() {
            bus.drain_local_queue().await;
          }
        }
      }
    })
  }

  /// Publishes immediately if the broker is reachable; otherwise (or
  /// on a failed publish) falls back to the local queue.
  pub async fn publish(&self, topic: &str, event: Event) -> Result<(), CoreError> {
    if !self.is_degraded() {
      let client_guard = self.inner.client.read().await;
      if let Some(client) = client_guard.as_ref() {
        let payload = serde_json::to_vec(&event).map_err(|e| CoreError::Validation(e.to_string()))?;
        let publish = tokio::time::timeout(PUBLISH_TIMEOUT, client.publish(topic.to_string(), payload.into()));
        match publish.await {
          Ok(Ok(())) => return Ok(()),
          Ok(Err(e)) => {
            warn!(%topic, error = %e, "publish failed, falling back to local queue");
            self.inner.degraded.store(true, Ordering::SeqCst);
          }
          Err(_) => {
            warn!(%topic, "publish timed out, falling back to local queue");
            self.inner.degraded.store(true, Ordering::SeqCst);
          }
        }
      }
    }
    drop(self.enqueue_locally(event).await);
    Ok(())
  }

  async fn enqueue_locally(&self, event: Event) -> bool {
    let mut queue = self.inner.local_queue.lock().await;
    let evicted = queue.push(event.clone());
    if evicted {
      warn!(max_size = self.inner.config.local_queue_max_size, "local event queue full, dropped oldest entry");
      let overflow = Event::new(
        chatcore_core::event::EventType::QueueOverflow,
        event.user_id.clone(),
        serde_json::json!({"topic_hint": event.event_type.as_str()}),
      );
      let _ = self.inner.warnings.send(overflow);
    }
    evicted
  }

  /// Drains the local queue back to the broker in FIFO order. A
  /// republish failure re-enqueues the event at the head and backs
  /// off, leaving the remainder for the next successful drain.
  async fn drain_local_queue(&self) {
    loop {
      let next = {
        let mut queue = self.inner.local_queue.lock().await;
        queue.pop_front()
      };
      let Some(event) = next else { break };

      let client_guard = self.inner.client.read().await;
      let Some(client) = client_guard.as_ref() else {
        drop(client_guard);
        let mut queue = self.inner.local_queue.lock().await;
        queue.push_front(event);
        break;
      };

      let topic = default_topic_for(&event);
      let payload = match serde_json::to_vec(&event) {
        Ok(p) => p,
        Err(e) => {
          error!(error = %e, "dropping unserializable queued event during drain");
          continue;
        }
      };

      match client.publish(topic, payload.into()).await {
        Ok(()) => continue,
        Err(e) => {
          warn!(error = %e, "drain republish failed, re-enqueueing and backing off");
          drop(client_guard);
          let mut queue = self.inner.local_queue.lock().await;
          queue.push_front(event);
          drop(queue);
          self.inner.degraded.store(true, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(500)).await;
          break;
        }
      }
    }
  }

  /// Registers an async handler for a topic. Idempotent per
  /// (topic, label): re-subscribing with the same label is a no-op.
  pub async fn subscribe(&self, topic: &str, label: &str, handler: Handler) {
    let mut entry = self.inner.subscriptions.entry(topic.to_string()).or_default();
    if entry.iter().any(|s| s.label == label) {
      return;
    }
    entry.push(Subscription {
      label: label.to_string(),
      handler,
    });
    drop(entry);

    if !self.is_degraded() {
      self.spawn_subscriber(topic.to_string());
    }
  }

  async fn resubscribe_all(&self) {
    let topics: Vec<String> = self.inner.subscriptions.iter().map(|e| e.key().clone()).collect();
    for topic in topics {
      self.spawn_subscriber(topic);
    }
  }

  fn spawn_subscriber(&self, topic: String) {
    let inner = Arc::clone(&self.inner);
    tokio::spawn(async move {
      let client = {
        let guard = inner.client.read().await;
        guard.clone()
      };
      let Some(client) = client else { return };
      let mut subscriber = match client.subscribe(topic.clone()).await {
        Ok(s) => s,
        Err(e) => {
          error!(%topic, error = %e, "failed to subscribe to topic");
          return;
        }
      };
      while let Some(message) = subscriber.next().await {
        let event: Event = match serde_json::from_slice(&message.payload) {
          Ok(e) => e,
          Err(e) => {
            warn!(%topic, error = %e, "dropping malformed event payload");
            continue;
          }
        };
        if !event.event_type.is_known() {
          debug!(%topic, event_type = %event.event_type, "dropping event of unrecognized type at subscribe time");
          continue;
        }
        let handlers = inner.subscriptions.get(&topic).map(|e| e.value().clone()).unwrap_or_default();
        for subscription in handlers {
          if let Err(e) = (subscription.handler)(event.clone()).await {
            warn!(%topic, label = %subscription.label, error = %e, "event_processing_failed");
          }
        }
      }
    });
  }

  /// Every enqueue already persists the local queue to disk; closing
  /// just drops the broker handle so in-flight subscriber tasks stop.
  pub async fn close(&self) {
    *self.inner.client.write().await = None;
  }
}

fn default_topic_for(event: &Event) -> String {
  format!("chatcore.{}", event.event_type.as_str())
}

#[cfg(test)]
mod tests {
  use super::*;
  use chatcore_core::event::EventType;

  #[tokio::test]
  async fn publish_without_broker_falls_back_to_local_queue() {
    let bus = EventBus::new(EventBusConfig {
      broker_url: "nats://127.0.0.1:1".to_string(),
      ..EventBusConfig::default()
    });
    assert!(bus.is_degraded());
    let event = Event::new(EventType::UserInteraction, None, serde_json::json!({"k": "v"}));
    bus.publish("chatcore.user_interaction", event).await.unwrap();
    assert_eq!(bus.inner.local_queue.lock().await.len(), 1);
  }

  #[tokio::test]
  async fn overflow_emits_a_warning_event() {
    let bus = EventBus::new(EventBusConfig {
      broker_url: "nats://127.0.0.1:1".to_string(),
      local_queue_max_size: 1,
      ..EventBusConfig::default()
    });
    let mut warnings = bus.warnings();
    bus
      .publish("t", Event::new(EventType::UserInteraction, None, serde_json::json!({})))
      .await
      .unwrap();
    bus
      .publish("t", Event::new(EventType::UserInteraction, None, serde_json::json!({})))
      .await
      .unwrap();
    let warning = warnings.try_recv().expect("expected an overflow warning");
    assert_eq!(warning.event_type, EventType::QueueOverflow);
  }
}
