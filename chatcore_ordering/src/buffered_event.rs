use std::cmp::Ordering;
use std::time::Instant;

use chatcore_core::event::Event;

/// An event wrapped with the local monotonic clock reading it arrived
/// at, used only to break ties between events with identical producer
/// timestamps.
#[derive(Debug, Clone)]
pub struct BufferedEvent {
  pub event: Event,
  pub inserted_at: Instant,
}

impl BufferedEvent {
  pub fn new(event: Event) -> Self {
    Self {
      event,
      inserted_at: Instant::now(),
    }
  }
}

impl PartialEq for BufferedEvent {
  fn eq(&self, other: &Self) -> bool {
    self.event.timestamp == other.event.timestamp && self.inserted_at == other.inserted_at
  }
}

impl Eq for BufferedEvent {}

impl PartialOrd for BufferedEvent {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for BufferedEvent {
  /// Ascending by producer timestamp, then by local arrival order.
  /// Earlier events sort first so a min-heap (or a sorted eviction
  /// pass) processes them in chronological order.
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .event
      .timestamp
      .cmp(&other.event.timestamp)
      .then_with(|| self.inserted_at.cmp(&other.inserted_at))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chatcore_core::event::EventType;
  use chrono::{Duration, Utc};

  #[test]
  fn orders_by_timestamp_then_arrival() {
    let now = Utc::now();
    let earlier = BufferedEvent::new(Event::with_timestamp(
      EventType::UserInteraction,
      None,
      serde_json::json!({}),
      now,
    ));
    let later = BufferedEvent::new(Event::with_timestamp(
      EventType::UserInteraction,
      None,
      serde_json::json!({}),
      now + Duration::seconds(1),
    ));
    assert!(earlier < later);
  }
}
