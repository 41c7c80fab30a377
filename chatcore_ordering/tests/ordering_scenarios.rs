use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use chatcore_core::event::{Event, EventType};
use chatcore_core::ids::UserId;
use chatcore_ordering::OrderingBuffer;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;

fn event_at(offset_secs: i64) -> Event {
  Event::with_timestamp(EventType::UserInteraction, None, serde_json::json!({}), Utc::now() + Duration::seconds(offset_secs))
}

/// Two users interleave events out of timestamp order; each user's
/// lane must still drain in timestamp order independently of the
/// other user's lane, per the per-user ordering contract in §4.C.
#[tokio::test]
async fn two_users_are_ordered_independently() {
  let buffer = OrderingBuffer::new(100);
  let alice = UserId::from("alice");
  let bob = UserId::from("bob");

  buffer.add(alice.clone(), event_at(3)).await;
  buffer.add(bob.clone(), event_at(9)).await;
  buffer.add(alice.clone(), event_at(1)).await;
  buffer.add(bob.clone(), event_at(2)).await;
  buffer.add(alice.clone(), event_at(2)).await;

  let alice_seen = Arc::new(Mutex::new(Vec::new()));
  let alice_clone = alice_seen.clone();
  let alice_processed = buffer
    .drain(&alice, 10, move |event| {
      let seen = alice_clone.clone();
      Box::pin(async move {
        seen.lock().await.push(event.timestamp);
        Ok(())
      })
    })
    .await;

  let bob_seen = Arc::new(Mutex::new(Vec::new()));
  let bob_clone = bob_seen.clone();
  let bob_processed = buffer
    .drain(&bob, 10, move |event| {
      let seen = bob_clone.clone();
      Box::pin(async move {
        seen.lock().await.push(event.timestamp);
        Ok(())
      })
    })
    .await;

  assert_eq!(alice_processed, 3);
  assert_eq!(bob_processed, 2);
  let alice_order = alice_seen.lock().await;
  assert!(alice_order.windows(2).all(|w| w[0] <= w[1]));
  let bob_order = bob_seen.lock().await;
  assert!(bob_order.windows(2).all(|w| w[0] <= w[1]));
}

/// Draining with a batch size smaller than the buffer's depth leaves
/// the remainder in place for a subsequent drain call, matching the
/// bounded drain contract `Coordinator::process_user_interaction`
/// relies on.
#[tokio::test]
async fn partial_drain_leaves_remainder_for_next_call() {
  let buffer = OrderingBuffer::new(100);
  let user = UserId::from("1");
  for offset in 0..5 {
    buffer.add(user.clone(), event_at(offset)).await;
  }

  let calls = Arc::new(AtomicUsize::new(0));
  let calls_clone = calls.clone();
  let first_batch = buffer
    .drain(&user, 2, move |_event| {
      calls_clone.fetch_add(1, AtomicOrdering::SeqCst);
      Box::pin(async { Ok(()) })
    })
    .await;
  assert_eq!(first_batch, 2);
  assert!(buffer.has_events(&user).await);

  let second_batch = buffer
    .drain(&user, 10, move |_event| {
      calls.fetch_add(1, AtomicOrdering::SeqCst);
      Box::pin(async { Ok(()) })
    })
    .await;
  assert_eq!(second_batch, 3);
  assert!(!buffer.has_events(&user).await);
}
