use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chatcore_core::error::CoreError;
use chatcore_core::event::{Event, EventType};
use chatcore_core::ids::{MessageId, UserId};
use chatcore_core::models::{Message, MessageStatus};
use chatcore_eventbus::EventBus;
use chatcore_services::topics::topic_for;
use chatcore_stores::StorePair;
use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::warn;

/// Capability the messenger needs to actually deliver a rendered
/// message. Implemented by the (out-of-scope) chat-platform transport;
/// the messenger itself only renders, persists, and tracks status.
#[async_trait]
pub trait ChatSender: Send + Sync {
  async fn send_message(&self, user_id: &UserId, content: &str) -> Result<(), CoreError>;
}

/// Templated, user-directed messenger with scheduling. Renders `$var`
/// substitutions from a context map (defaulted with `user_name`,
/// `bot_name`, `timestamp`), persists a `Message` record in the
/// document store, sends via the injected `ChatSender`, and exposes
/// `schedule` for a future `scheduled_time` promoted later by the
/// periodic scanner rather than a per-message timer (§9).
pub struct Messenger {
  stores: Arc<StorePair>,
  event_bus: Arc<EventBus>,
  sender: Arc<dyn ChatSender>,
  bot_name: String,
}

impl Messenger {
  pub fn new(stores: Arc<StorePair>, event_bus: Arc<EventBus>, sender: Arc<dyn ChatSender>, bot_name: impl Into<String>) -> Self {
    Self {
      stores,
      event_bus,
      sender,
      bot_name: bot_name.into(),
    }
  }

  fn default_context(&self, user_name: &str, now: chrono::DateTime<Utc>) -> HashMap<String, Value> {
    let mut context = HashMap::new();
    context.insert("user_name".to_string(), Value::String(user_name.to_string()));
    context.insert("bot_name".to_string(), Value::String(self.bot_name.clone()));
    context.insert("timestamp".to_string(), Value::String(now.to_rfc3339()));
    context
  }

  /// Substitutes `$var` tokens from `context`. A token with no entry
  /// in `context` is left verbatim (including its `$`) rather than
  /// blanked, so a missing-variable authoring bug shows up in the
  /// rendered text instead of disappearing silently.
  pub fn render(template: &str, context: &HashMap<String, Value>) -> String {
    let chars: Vec<char> = template.chars().collect();
    let mut output = String::with_capacity(template.len());
    let mut i = 0;

    while i < chars.len() {
      if chars[i] == '$' {
        let start = i + 1;
        let mut end = start;
        while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
          end += 1;
        }
        if end > start {
          let var_name: String = chars[start..end].iter().collect();
          match context.get(&var_name) {
            Some(value) => output.push_str(&render_value(value)),
            None => {
              output.push('$');
              output.push_str(&var_name);
            }
          }
          i = end;
          continue;
        }
      }
      output.push(chars[i]);
      i += 1;
    }

    output
  }

  /// Renders and sends a message immediately, persisting it first as
  /// `pending` so a crash between persist and send still leaves a
  /// record the scanner (or an operator) can reconcile.
  pub async fn send_now(
    &self,
    user_id: &UserId,
    template_id: impl Into<String>,
    template: &str,
    mut context: HashMap<String, Value>,
    user_name: &str,
  ) -> Result<Message, CoreError> {
    let now = Utc::now();
    for (key, value) in self.default_context(user_name, now) {
      context.entry(key).or_insert(value);
    }
    let rendered = Self::render(template, &context);

    let mut message = Message::new_immediate(user_id.clone(), template_id, rendered.clone());
    self.stores.document.insert_message(&message).await?;

    match self.sender.send_message(user_id, &rendered).await {
      Ok(()) => {
        message.mark_sent(Utc::now());
        self.stores.document.update_message(&message).await?;
        self.emit_sent(&message).await?;
      }
      Err(e) => {
        warn!(%user_id, template_id = %message.template_id, error = %e, "lucien_message_failed");
        message.mark_failed(e.to_string());
        self.stores.document.update_message(&message).await?;
        self.emit_failed(&message).await?;
      }
    }

    Ok(message)
  }

  /// Renders now (so authoring errors surface immediately) but defers
  /// delivery to the scanner by persisting with a future
  /// `scheduled_time`.
  pub async fn schedule(
    &self,
    user_id: &UserId,
    template_id: impl Into<String>,
    template: &str,
    mut context: HashMap<String, Value>,
    user_name: &str,
    delay: Duration,
  ) -> Result<Message, CoreError> {
    let now = Utc::now();
    for (key, value) in self.default_context(user_name, now) {
      context.entry(key).or_insert(value);
    }
    let rendered = Self::render(template, &context);
    let scheduled_time = now + delay;

    let message = Message::new_scheduled(user_id.clone(), template_id, rendered, scheduled_time);
    self.stores.document.insert_message(&message).await?;
    Ok(message)
  }

  /// Marks a still-pending scheduled message as cancelled. A message
  /// already sent or failed is left untouched.
  pub async fn cancel(&self, message_id: &MessageId) -> Result<(), CoreError> {
    let Some(mut message) = self.stores.document.find_message(message_id).await? else {
      return Err(CoreError::NotFound(message_id.to_string()));
    };
    if message.status == MessageStatus::Pending {
      message.status = MessageStatus::Cancelled;
      self.stores.document.update_message(&message).await?;
    }
    Ok(())
  }

  /// Selects `status=pending AND scheduled_time <= now` and invokes
  /// the send path for each — the single periodic scanner that
  /// replaces per-message timers (§9 design notes).
  pub async fn scan_and_send_due(&self) -> Result<usize, CoreError> {
    let now = Utc::now();
    let due = self.stores.document.find_due_messages(now).await?;
    let mut sent = 0;

    for mut message in due {
      match self.sender.send_message(&message.user_id, &message.rendered_content).await {
        Ok(()) => {
          message.mark_sent(now);
          sent += 1;
          self.emit_sent(&message).await?;
        }
        Err(e) => {
          warn!(user_id = %message.user_id, message_id = %message.message_id, error = %e, "lucien_message_failed");
          message.mark_failed(e.to_string());
          self.emit_failed(&message).await?;
        }
      }
      self.stores.document.update_message(&message).await?;
    }

    Ok(sent)
  }

  /// Spawns the periodic scanner as a long-lived task, per the
  /// scheduling model in §5.
  pub fn spawn_scanner(self: Arc<Self>, interval: StdDuration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      loop {
        ticker.tick().await;
        if let Err(e) = self.scan_and_send_due().await {
          warn!(error = %e, "scheduled message scan failed");
        }
      }
    })
  }

  async fn emit_sent(&self, message: &Message) -> Result<(), CoreError> {
    let event = Event::new(
      EventType::LucienMessageSent,
      Some(message.user_id.clone()),
      serde_json::json!({"message_id": message.message_id.to_string(), "template_id": message.template_id}),
    );
    self.event_bus.publish(&topic_for(&EventType::LucienMessageSent), event).await
  }

  async fn emit_failed(&self, message: &Message) -> Result<(), CoreError> {
    let event = Event::new(
      EventType::LucienMessageFailed,
      Some(message.user_id.clone()),
      serde_json::json!({
        "message_id": message.message_id.to_string(),
        "template_id": message.template_id,
        "retry_count": message.retry_count,
        "error": message.error_message,
      }),
    );
    self.event_bus.publish(&topic_for(&EventType::LucienMessageFailed), event).await
  }
}

fn render_value(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn renders_known_variables_and_leaves_unknown_verbatim() {
    let mut context = HashMap::new();
    context.insert("name".to_string(), Value::String("Ana".to_string()));
    let rendered = Messenger::render("Hola $name, bienvenida a $bot_name!", &context);
    assert_eq!(rendered, "Hola Ana, bienvenida a $bot_name!");
  }

  #[test]
  fn dollar_with_no_identifier_is_left_alone() {
    let context = HashMap::new();
    let rendered = Messenger::render("Costs $5 today", &context);
    assert_eq!(rendered, "Costs $5 today");
  }
}
