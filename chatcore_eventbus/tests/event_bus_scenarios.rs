use chatcore_core::event::{Event, EventType};
use chatcore_eventbus::{EventBus, EventBusConfig};
use tempfile::tempdir;

/// A broker the bus can never reach: publishes must fall back to the
/// local queue instead of failing the caller, and the queue must
/// survive a restart of the process via its persistence file — the
/// end-to-end broker-outage scenario from §8.
#[tokio::test]
async fn unreachable_broker_falls_back_and_survives_restart() {
  let dir = tempdir().unwrap();
  let persistence_file = dir.path().join("queue.jsonl");

  let bus = EventBus::new(EventBusConfig {
    broker_url: "nats://127.0.0.1:1".to_string(),
    local_queue_persistence_file: Some(persistence_file.to_string_lossy().to_string()),
    ..EventBusConfig::default()
  });
  assert!(bus.is_degraded());

  bus
    .publish(
      "chatcore.user_registered",
      Event::new(EventType::UserRegistered, None, serde_json::json!({"n": 1})),
    )
    .await
    .unwrap();
  bus
    .publish(
      "chatcore.user_registered",
      Event::new(EventType::UserRegistered, None, serde_json::json!({"n": 2})),
    )
    .await
    .unwrap();

  assert_eq!(bus.queued_len().await, 2);
  drop(bus);

  let restarted = EventBus::new(EventBusConfig {
    broker_url: "nats://127.0.0.1:1".to_string(),
    local_queue_persistence_file: Some(persistence_file.to_string_lossy().to_string()),
    ..EventBusConfig::default()
  });
  assert!(restarted.is_degraded());
  assert_eq!(restarted.queued_len().await, 2);
}

/// Exceeding the local queue's capacity while degraded drops the
/// oldest entry and surfaces a `queue_overflow` warning on the bus's
/// operator-visible channel, without failing the publishing caller.
#[tokio::test]
async fn overflow_while_degraded_warns_but_does_not_fail_publish() {
  let bus = EventBus::new(EventBusConfig {
    broker_url: "nats://127.0.0.1:1".to_string(),
    local_queue_max_size: 1,
    ..EventBusConfig::default()
  });
  let mut warnings = bus.warnings();

  bus
    .publish("chatcore.reaction_detected", Event::new(EventType::ReactionDetected, None, serde_json::json!({})))
    .await
    .unwrap();
  bus
    .publish("chatcore.reaction_detected", Event::new(EventType::ReactionDetected, None, serde_json::json!({})))
    .await
    .unwrap();

  let warning = warnings.try_recv().expect("expected a queue_overflow warning");
  assert_eq!(warning.event_type, EventType::QueueOverflow);
}
