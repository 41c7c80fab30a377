//! Newtype wrappers for the identifiers that flow through the core.
//!
//! These provide type safety and prevent mixing up different kinds of
//! identity (a platform user id is not a fragment id is not an event id).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a user, in the string form the chat platform hands us
/// (e.g. the decimal string form of a Telegram numeric user id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Numeric platform user id, as stored on the relational side.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct TelegramUserId(pub i64);

/// Narrative fragment identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(pub String);

/// Narrative choice identifier, unique within a fragment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChoiceId(pub String);

/// Hint (pista) identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HintId(pub String);

/// Unique event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub uuid::Uuid);

impl EventId {
  pub fn new() -> Self {
    Self(uuid::Uuid::new_v4())
  }
}

impl Default for EventId {
  fn default() -> Self {
    Self::new()
  }
}

/// Unique outbound message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub uuid::Uuid);

impl MessageId {
  pub fn new() -> Self {
    Self(uuid::Uuid::new_v4())
  }
}

impl Default for MessageId {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for UserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for TelegramUserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for FragmentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for ChoiceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for HintId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for EventId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for MessageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for UserId {
  fn from(s: &str) -> Self {
    UserId(s.to_string())
  }
}

impl From<String> for UserId {
  fn from(s: String) -> Self {
    UserId(s)
  }
}

impl From<TelegramUserId> for UserId {
  fn from(id: TelegramUserId) -> Self {
    UserId(id.0.to_string())
  }
}

impl From<i64> for TelegramUserId {
  fn from(id: i64) -> Self {
    TelegramUserId(id)
  }
}

impl From<&str> for FragmentId {
  fn from(s: &str) -> Self {
    FragmentId(s.to_string())
  }
}

impl From<String> for FragmentId {
  fn from(s: String) -> Self {
    FragmentId(s)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn user_id_roundtrips_through_telegram_id() {
    let tid = TelegramUserId(42);
    let uid: UserId = tid.into();
    assert_eq!(uid.0, "42");
  }

  #[test]
  fn ids_compare_by_inner_value() {
    let a = FragmentId::from("start");
    let b = FragmentId::from("start");
    let c = FragmentId::from("secret_01");
    assert_eq!(a, b);
    assert_ne!(a, c);
  }
}
