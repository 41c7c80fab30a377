use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;

use chatcore_core::error::CoreError;
use chatcore_core::event::Event;
use chatcore_core::ids::UserId;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::buffered_event::BufferedEvent;

pub type DrainHandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send + 'a>>;

/// Outcome of `add`: whether the buffer accepted the event cleanly or
/// had to drop its latest (chronologically) entry to stay within
/// `max_buffer_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
  Ok,
  Full,
}

/// Per-user min-heap of pending events, replayed to a handler in
/// `(timestamp, inserted_at)` order. Producer clocks are trusted for
/// ordering; the buffer itself only guarantees a deterministic replay
/// even when they are not monotonic.
pub struct OrderingBuffer {
  buffers: DashMap<UserId, Mutex<BinaryHeap<Reverse<BufferedEvent>>>>,
  max_buffer_size: usize,
}

impl OrderingBuffer {
  pub fn new(max_buffer_size: usize) -> Self {
    Self {
      buffers: DashMap::new(),
      max_buffer_size,
    }
  }

  /// Pushes `event` onto `user_id`'s heap. If this pushes the buffer
  /// past capacity, the chronologically latest entries are dropped
  /// (not the one just added, necessarily — whichever entries sort
  /// last) and a `buffer_overflow` warning is logged.
  pub async fn add(&self, user_id: UserId, event: Event) -> AddOutcome {
    let lane = self.buffers.entry(user_id.clone()).or_insert_with(|| Mutex::new(BinaryHeap::new()));
    let mut heap = lane.lock().await;
    heap.push(Reverse(BufferedEvent::new(event)));

    if heap.len() <= self.max_buffer_size {
      return AddOutcome::Ok;
    }

    let mut items: Vec<BufferedEvent> = heap.drain().map(|Reverse(e)| e).collect();
    items.sort();
    items.truncate(self.max_buffer_size);
    *heap = items.into_iter().map(Reverse).collect();

    warn!(%user_id, max_buffer_size = self.max_buffer_size, "buffer_overflow: dropped latest entries beyond capacity");
    AddOutcome::Full
  }

  /// Pops up to `max` events in heap order and invokes `handler`
  /// sequentially. A handler failure drops that event and continues;
  /// it does not abort the drain or re-enqueue.
  pub async fn drain<F>(&self, user_id: &UserId, max: usize, mut handler: F) -> usize
  where
    F: FnMut(Event) -> DrainHandlerFuture<'static>,
  {
    let Some(lane) = self.buffers.get(user_id) else { return 0 };
    let mut processed = 0;

    for _ in 0..max {
      let next = {
        let mut heap = lane.lock().await;
        heap.pop().map(|Reverse(e)| e)
      };
      let Some(buffered) = next else { break };

      match handler(buffered.event.clone()).await {
        Ok(()) => processed += 1,
        Err(e) => {
          warn!(%user_id, error = %e, "event_processing_failed: dropping event from buffer");
        }
      }
    }

    let is_empty = {
      let heap = lane.lock().await;
      heap.is_empty()
    };
    drop(lane);
    if is_empty {
      self.buffers.remove(user_id);
    }

    processed
  }

  pub async fn peek_next_timestamp(&self, user_id: &UserId) -> Option<chrono::DateTime<chrono::Utc>> {
    let lane = self.buffers.get(user_id)?;
    let heap = lane.lock().await;
    heap.peek().map(|Reverse(e)| e.event.timestamp)
  }

  pub async fn has_events(&self, user_id: &UserId) -> bool {
    match self.buffers.get(user_id) {
      Some(lane) => !lane.lock().await.is_empty(),
      None => false,
    }
  }

  pub async fn status(&self) -> HashMap<UserId, usize> {
    let mut out = HashMap::new();
    for entry in self.buffers.iter() {
      let size = entry.value().lock().await.len();
      out.insert(entry.key().clone(), size);
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chatcore_core::event::EventType;
  use chrono::{Duration, Utc};
  use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
  use std::sync::Arc;

  fn event_at(offset_secs: i64) -> Event {
    Event::with_timestamp(
      EventType::UserInteraction,
      None,
      serde_json::json!({}),
      Utc::now() + Duration::seconds(offset_secs),
    )
  }

  #[tokio::test]
  async fn drains_events_in_timestamp_order_regardless_of_insertion_order() {
    let buffer = OrderingBuffer::new(100);
    let user = UserId::from("1");

    buffer.add(user.clone(), event_at(5)).await;
    buffer.add(user.clone(), event_at(1)).await;
    buffer.add(user.clone(), event_at(3)).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let processed = buffer
      .drain(&user, 10, move |event| {
        let seen = seen_clone.clone();
        Box::pin(async move {
          seen.lock().await.push(event.timestamp);
          Ok(())
        })
      })
      .await;

    assert_eq!(processed, 3);
    let observed = seen.lock().await;
    assert!(observed.windows(2).all(|w| w[0] <= w[1]));
  }

  #[tokio::test]
  async fn overflow_keeps_the_chronologically_earliest_events() {
    let buffer = OrderingBuffer::new(2);
    let user = UserId::from("1");

    assert_eq!(buffer.add(user.clone(), event_at(1)).await, AddOutcome::Ok);
    assert_eq!(buffer.add(user.clone(), event_at(2)).await, AddOutcome::Ok);
    assert_eq!(buffer.add(user.clone(), event_at(3)).await, AddOutcome::Full);

    let next = buffer.peek_next_timestamp(&user).await.unwrap();
    let baseline = event_at(0).timestamp;
    assert!((next - baseline).num_seconds() <= 2);
  }

  #[tokio::test]
  async fn handler_failure_drops_event_and_continues() {
    let buffer = OrderingBuffer::new(100);
    let user = UserId::from("1");
    buffer.add(user.clone(), event_at(1)).await;
    buffer.add(user.clone(), event_at(2)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let processed = buffer
      .drain(&user, 10, move |_event| {
        let calls = calls_clone.clone();
        Box::pin(async move {
          let n = calls.fetch_add(1, AtomicOrdering::SeqCst);
          if n == 0 {
            Err(CoreError::EventProcessingFailed("boom".into()))
          } else {
            Ok(())
          }
        })
      })
      .await;

    assert_eq!(processed, 1);
    assert!(!buffer.has_events(&user).await);
  }
}
