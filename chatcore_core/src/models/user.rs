use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::{TelegramUserId, UserId};
use crate::models::narrative::NarrativeProgress;

/// User-facing preferences, stored on the document side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
  pub language: String,
  pub notifications_enabled: bool,
  pub theme: String,
}

impl Default for UserPreferences {
  fn default() -> Self {
    Self {
      language: "en".to_string(),
      notifications_enabled: true,
      theme: "default".to_string(),
    }
  }
}

/// Free-form session data plus the last-activity timestamp used to
/// decide idle timeouts and resumption behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionData {
  pub last_activity: Option<DateTime<Utc>>,
  #[serde(default)]
  pub data: HashMap<String, serde_json::Value>,
}

/// Current menu/navigation context plus embedded narrative progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentState {
  pub menu_context: String,
  pub narrative_progress: NarrativeProgress,
  pub session: SessionData,
}

impl Default for CurrentState {
  fn default() -> Self {
    Self {
      menu_context: "main_menu".to_string(),
      narrative_progress: NarrativeProgress::default(),
      session: SessionData::default(),
    }
  }
}

/// One entry in a user's append-only view history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewHistoryEntry {
  pub content_id: String,
  pub content_type: String,
  pub viewed_at: DateTime<Utc>,
}

/// The document-store half of a user record: dynamic state that
/// changes on nearly every interaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserDocument {
  pub user_id: UserId,
  pub current_state: CurrentState,
  pub preferences: UserPreferences,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub besitos_balance: i64,
  pub narrative_level: i32,
  #[serde(default)]
  pub view_history: Vec<ViewHistoryEntry>,
}

impl UserDocument {
  /// Build the default document for a brand-new user, per the
  /// create-user path in section 4.D.
  pub fn new_default(user_id: UserId, language: impl Into<String>, now: DateTime<Utc>) -> Self {
    Self {
      user_id,
      current_state: CurrentState::default(),
      preferences: UserPreferences {
        language: language.into(),
        ..UserPreferences::default()
      },
      created_at: now,
      updated_at: now,
      besitos_balance: 0,
      narrative_level: 1,
      view_history: Vec::new(),
    }
  }
}

/// The relational-store half of a user record: profile and
/// registration bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
  pub user_id: UserId,
  pub telegram_user_id: TelegramUserId,
  pub username: Option<String>,
  pub first_name: String,
  pub last_name: Option<String>,
  pub language_code: String,
  pub registration_date: DateTime<Utc>,
  pub last_login: DateTime<Utc>,
  pub is_active: bool,
}

impl UserProfile {
  pub fn new_default(
    user_id: UserId,
    telegram_user_id: TelegramUserId,
    username: Option<String>,
    first_name: String,
    last_name: Option<String>,
    language_code: String,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      user_id,
      telegram_user_id,
      username,
      first_name,
      last_name,
      language_code,
      registration_date: now,
      last_login: now,
      is_active: true,
    }
  }
}

/// Merged view of a user spanning both stores, as returned by
/// `get_user_context`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserContext {
  pub document: UserDocument,
  pub profile: UserProfile,
}

impl UserContext {
  pub fn user_id(&self) -> &UserId {
    &self.document.user_id
  }
}

/// Input blob handed in from the (out-of-scope) chat-platform
/// transport when a user first interacts with the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformUserBlob {
  pub telegram_user_id: TelegramUserId,
  pub username: Option<String>,
  pub first_name: String,
  pub last_name: Option<String>,
  pub language_code: Option<String>,
}

impl PlatformUserBlob {
  pub fn user_id(&self) -> UserId {
    UserId::from(self.telegram_user_id)
  }
}

/// Partial update to a user's profile (RS side only).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfilePatch {
  pub username: Option<String>,
  pub first_name: Option<String>,
  pub last_name: Option<String>,
  pub language_code: Option<String>,
  pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_default_document_matches_cold_start_scenario() {
    let now = Utc::now();
    let doc = UserDocument::new_default(UserId::from("42"), "es", now);
    assert_eq!(doc.besitos_balance, 0);
    assert_eq!(doc.narrative_level, 1);
    assert_eq!(doc.current_state.menu_context, "main_menu");
    assert_eq!(doc.preferences.language, "es");
  }
}
