use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
  Pending,
  Sent,
  Failed,
  Cancelled,
}

/// An outbound, templated message persisted in the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
  pub message_id: MessageId,
  pub user_id: UserId,
  pub template_id: String,
  pub rendered_content: String,
  pub status: MessageStatus,
  pub scheduled_time: Option<DateTime<Utc>>,
  pub sent_time: Option<DateTime<Utc>>,
  pub retry_count: u32,
  pub error_message: Option<String>,
}

impl Message {
  pub fn new_immediate(user_id: UserId, template_id: impl Into<String>, rendered_content: String) -> Self {
    Self {
      message_id: MessageId::new(),
      user_id,
      template_id: template_id.into(),
      rendered_content,
      status: MessageStatus::Pending,
      scheduled_time: None,
      sent_time: None,
      retry_count: 0,
      error_message: None,
    }
  }

  pub fn new_scheduled(
    user_id: UserId,
    template_id: impl Into<String>,
    rendered_content: String,
    scheduled_time: DateTime<Utc>,
  ) -> Self {
    Self {
      scheduled_time: Some(scheduled_time),
      ..Self::new_immediate(user_id, template_id, rendered_content)
    }
  }

  pub fn mark_sent(&mut self, now: DateTime<Utc>) {
    self.status = MessageStatus::Sent;
    self.sent_time = Some(now);
    self.error_message = None;
  }

  pub fn mark_failed(&mut self, error: impl Into<String>) {
    self.status = MessageStatus::Failed;
    self.retry_count += 1;
    self.error_message = Some(error.into());
  }

  pub fn is_due(&self, now: DateTime<Utc>) -> bool {
    self.status == MessageStatus::Pending
      && self.scheduled_time.map(|t| t <= now).unwrap_or(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scheduled_message_is_not_due_until_its_time() {
    let now = Utc::now();
    let future = now + chrono::Duration::minutes(5);
    let msg = Message::new_scheduled(UserId::from("1"), "tmpl", "hi".into(), future);
    assert!(!msg.is_due(now));
    assert!(msg.is_due(future));
  }

  #[test]
  fn failed_message_bumps_retry_count() {
    let mut msg = Message::new_immediate(UserId::from("1"), "tmpl", "hi".into());
    msg.mark_failed("timeout");
    assert_eq!(msg.retry_count, 1);
    assert_eq!(msg.status, MessageStatus::Failed);
  }
}
