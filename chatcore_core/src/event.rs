use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{EventId, UserId};

/// The closed set of event types this core consumes. Producers may
/// mint additional types (captured in `Unknown`); subscribers drop
/// those at subscribe-time with a warning rather than failing, per
/// the duck-typed-payload design note.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
  UserRegistered,
  UserInteraction,
  UserStateUpdated,
  UserDeleted,
  SubscriptionCreated,
  SubscriptionUpdated,
  SubscriptionUpgraded,
  DecisionMade,
  ContentViewed,
  ReactionDetected,
  BesitosAwarded,
  BesitosTransaction,
  NarrativeHintUnlocked,
  NarrativeFragmentAccessed,
  NarrativeProgressUpdated,
  NarrativeCheckpointReached,
  VipAccessGranted,
  LucienMessageSent,
  LucienMessageFailed,
  EventProcessingFailed,
  QueueOverflow,
  BufferOverflow,
  Unknown(String),
}

impl EventType {
  pub fn as_str(&self) -> &str {
    match self {
      EventType::UserRegistered => "user_registered",
      EventType::UserInteraction => "user_interaction",
      EventType::UserStateUpdated => "user_state_updated",
      EventType::UserDeleted => "user_deleted",
      EventType::SubscriptionCreated => "subscription_created",
      EventType::SubscriptionUpdated => "subscription_updated",
      EventType::SubscriptionUpgraded => "subscription_upgraded",
      EventType::DecisionMade => "decision_made",
      EventType::ContentViewed => "content_viewed",
      EventType::ReactionDetected => "reaction_detected",
      EventType::BesitosAwarded => "besitos_awarded",
      EventType::BesitosTransaction => "besitos_transaction",
      EventType::NarrativeHintUnlocked => "narrative_hint_unlocked",
      EventType::NarrativeFragmentAccessed => "narrative_fragment_accessed",
      EventType::NarrativeProgressUpdated => "narrative_progress_updated",
      EventType::NarrativeCheckpointReached => "narrative_checkpoint_reached",
      EventType::VipAccessGranted => "vip_access_granted",
      EventType::LucienMessageSent => "lucien_message_sent",
      EventType::LucienMessageFailed => "lucien_message_failed",
      EventType::EventProcessingFailed => "event_processing_failed",
      EventType::QueueOverflow => "queue_overflow",
      EventType::BufferOverflow => "buffer_overflow",
      EventType::Unknown(s) => s.as_str(),
    }
  }

  pub fn parse(s: &str) -> Self {
    match s {
      "user_registered" => EventType::UserRegistered,
      "user_interaction" => EventType::UserInteraction,
      "user_state_updated" => EventType::UserStateUpdated,
      "user_deleted" => EventType::UserDeleted,
      "subscription_created" => EventType::SubscriptionCreated,
      "subscription_updated" => EventType::SubscriptionUpdated,
      "subscription_upgraded" => EventType::SubscriptionUpgraded,
      "decision_made" => EventType::DecisionMade,
      "content_viewed" => EventType::ContentViewed,
      "reaction_detected" => EventType::ReactionDetected,
      "besitos_awarded" => EventType::BesitosAwarded,
      "besitos_transaction" => EventType::BesitosTransaction,
      "narrative_hint_unlocked" => EventType::NarrativeHintUnlocked,
      "narrative_fragment_accessed" => EventType::NarrativeFragmentAccessed,
      "narrative_progress_updated" => EventType::NarrativeProgressUpdated,
      "narrative_checkpoint_reached" => EventType::NarrativeCheckpointReached,
      "vip_access_granted" => EventType::VipAccessGranted,
      "lucien_message_sent" => EventType::LucienMessageSent,
      "lucien_message_failed" => EventType::LucienMessageFailed,
      "event_processing_failed" => EventType::EventProcessingFailed,
      "queue_overflow" => EventType::QueueOverflow,
      "buffer_overflow" => EventType::BufferOverflow,
      other => EventType::Unknown(other.to_string()),
    }
  }

  /// Whether this is one of the types the core itself recognizes and
  /// will route to a handler, as opposed to a producer-defined type.
  pub fn is_known(&self) -> bool {
    !matches!(self, EventType::Unknown(_))
  }
}

impl fmt::Display for EventType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl Serialize for EventType {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(self.as_str())
  }
}

impl<'de> Deserialize<'de> for EventType {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    let s = String::deserialize(deserializer)?;
    Ok(EventType::parse(&s))
  }
}

/// A bus payload: identity, type, optional owning user, producer
/// timestamp, and a type-specific JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
  pub event_id: EventId,
  pub event_type: EventType,
  pub user_id: Option<UserId>,
  pub timestamp: DateTime<Utc>,
  pub payload: serde_json::Value,
}

impl Event {
  pub fn new(event_type: EventType, user_id: Option<UserId>, payload: serde_json::Value) -> Self {
    Self {
      event_id: EventId::new(),
      event_type,
      user_id,
      timestamp: Utc::now(),
      payload,
    }
  }

  /// Build an event with an explicit producer timestamp, for callers
  /// (and tests) that need to control ordering precisely.
  pub fn with_timestamp(
    event_type: EventType,
    user_id: Option<UserId>,
    payload: serde_json::Value,
    timestamp: DateTime<Utc>,
  ) -> Self {
    Self {
      event_id: EventId::new(),
      event_type,
      user_id,
      timestamp,
      payload,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_event_types_round_trip_their_string() {
    let et = EventType::parse("some_future_event");
    assert!(!et.is_known());
    assert_eq!(et.as_str(), "some_future_event");
  }

  #[test]
  fn known_event_type_serializes_as_plain_string() {
    let json = serde_json::to_string(&EventType::ReactionDetected).unwrap();
    assert_eq!(json, "\"reaction_detected\"");
  }
}
