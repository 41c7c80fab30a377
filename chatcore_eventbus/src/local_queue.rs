use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use chatcore_core::event::Event;
use tracing::warn;

/// Bounded, file-backed FIFO used while the broker is unreachable.
/// Each line in the persistence file is one JSON-encoded event,
/// oldest first. Rewritten wholesale on every enqueue batch and on
/// shutdown; a malformed trailing line (partial write from a crash)
/// is tolerated by truncating the read at that point.
pub struct LocalQueue {
  items: VecDeque<Event>,
  max_size: usize,
  persistence_file: Option<PathBuf>,
}

impl LocalQueue {
  pub fn new(max_size: usize, persistence_file: Option<PathBuf>) -> Self {
    Self {
      items: VecDeque::new(),
      max_size,
      persistence_file,
    }
  }

  /// Loads whatever was persisted from a previous run, if any.
  pub fn restore(&mut self) {
    let Some(path) = &self.persistence_file else { return };
    let file = match std::fs::File::open(path) {
      Ok(f) => f,
      Err(_) => return,
    };
    let reader = std::io::BufReader::new(file);
    let mut restored = VecDeque::new();
    for line in reader.lines() {
      let line = match line {
        Ok(l) => l,
        Err(e) => {
          warn!(error = %e, "local queue persistence file unreadable past this point, truncating");
          break;
        }
      };
      if line.trim().is_empty() {
        continue;
      }
      match serde_json::from_str::<Event>(&line) {
        Ok(event) => restored.push_back(event),
        Err(e) => {
          warn!(error = %e, "malformed local queue record, truncating tail");
          break;
        }
      }
    }
    self.items = restored;
  }

  /// Pushes an event, evicting the oldest entry if the queue is at
  /// capacity. Returns true if an eviction occurred.
  pub fn push(&mut self, event: Event) -> bool {
    let mut evicted = false;
    if self.items.len() >= self.max_size {
      self.items.pop_front();
      evicted = true;
    }
    self.items.push_back(event);
    self.persist();
    evicted
  }

  /// Re-enqueues at the head — used when a drained event fails to
  /// republish and must be retried before newer events.
  pub fn push_front(&mut self, event: Event) {
    self.items.push_front(event);
    self.persist();
  }

  pub fn pop_front(&mut self) -> Option<Event> {
    let item = self.items.pop_front();
    if item.is_some() {
      self.persist();
    }
    item
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  fn persist(&self) {
    let Some(path) = &self.persistence_file else { return };
    let tmp_path = path.with_extension("tmp");
    let write_result = (|| -> std::io::Result<()> {
      let mut file = std::fs::File::create(&tmp_path)?;
      for event in &self.items {
        let line = serde_json::to_string(event).unwrap_or_default();
        writeln!(file, "{line}")?;
      }
      file.flush()?;
      std::fs::rename(&tmp_path, path)?;
      Ok(())
    })();
    if let Err(e) = write_result {
      warn!(error = %e, "failed to persist local event queue to disk");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chatcore_core::event::EventType;
  use tempfile::tempdir;

  #[test]
  fn eviction_drops_oldest_when_full() {
    let mut queue = LocalQueue::new(2, None);
    assert!(!queue.push(Event::new(EventType::UserInteraction, None, serde_json::json!({"n": 1}))));
    assert!(!queue.push(Event::new(EventType::UserInteraction, None, serde_json::json!({"n": 2}))));
    assert!(queue.push(Event::new(EventType::UserInteraction, None, serde_json::json!({"n": 3}))));
    assert_eq!(queue.len(), 2);
    let first = queue.pop_front().unwrap();
    assert_eq!(first.payload["n"], 2);
  }

  #[test]
  fn restore_tolerates_malformed_trailing_line() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.jsonl");
    let good = Event::new(EventType::ContentViewed, None, serde_json::json!({"ok": true}));
    let good_line = serde_json::to_string(&good).unwrap();
    std::fs::write(&path, format!("{good_line}\nnot valid json\n")).unwrap();

    let mut queue = LocalQueue::new(100, Some(path));
    queue.restore();
    assert_eq!(queue.len(), 1);
  }

  #[test]
  fn persists_and_restores_across_instances() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.jsonl");

    let mut queue = LocalQueue::new(100, Some(path.clone()));
    queue.push(Event::new(EventType::ReactionDetected, None, serde_json::json!({"a": 1})));
    queue.push(Event::new(EventType::ReactionDetected, None, serde_json::json!({"a": 2})));

    let mut reloaded = LocalQueue::new(100, Some(path));
    reloaded.restore();
    assert_eq!(reloaded.len(), 2);
  }
}
