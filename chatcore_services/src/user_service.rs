use std::sync::Arc;

use chatcore_core::error::CoreError;
use chatcore_core::event::{Event, EventType};
use chatcore_core::ids::UserId;
use chatcore_core::models::{CurrentState, PlatformUserBlob, UserContext, UserDocument, UserProfile, UserProfilePatch};
use chatcore_eventbus::EventBus;
use chatcore_stores::StorePair;
use chrono::Utc;

use crate::topics::topic_for;

/// Atomic create/read/update/delete spanning both stores. Every
/// mutation that changes a user's lifecycle publishes the
/// corresponding event; reads repair Invariant U1 lazily via the
/// Store Pair.
pub struct UserService {
  stores: Arc<StorePair>,
  event_bus: Arc<EventBus>,
}

impl UserService {
  pub fn new(stores: Arc<StorePair>, event_bus: Arc<EventBus>) -> Self {
    Self { stores, event_bus }
  }

  /// Builds DS/RS defaults from the platform blob and commits them
  /// atomically. A user who already exists is reported as
  /// `Duplicate`, matching the Store Pair's insert semantics.
  pub async fn create_user(&self, blob: PlatformUserBlob) -> Result<UserContext, CoreError> {
    let user_id = blob.user_id();
    let now = Utc::now();
    let language = blob.language_code.clone().unwrap_or_else(|| "en".to_string());

    let document = UserDocument::new_default(user_id.clone(), language, now);
    let profile = UserProfile::new_default(
      user_id.clone(),
      blob.telegram_user_id,
      blob.username,
      blob.first_name,
      blob.last_name,
      blob.language_code.unwrap_or_else(|| "en".to_string()),
      now,
    );

    self.stores.create_user_atomic(document.clone(), profile.clone()).await?;

    let event = Event::new(
      EventType::UserRegistered,
      Some(user_id.clone()),
      serde_json::json!({"user_id": user_id.to_string()}),
    );
    self.event_bus.publish(&topic_for(&EventType::UserRegistered), event).await?;

    Ok(UserContext { document, profile })
  }

  pub async fn get_user_context(&self, user_id: &UserId) -> Result<Option<UserContext>, CoreError> {
    self.stores.get_user_context(user_id).await
  }

  pub async fn update_user_state(&self, user_id: &UserId, state: CurrentState) -> Result<(), CoreError> {
    let now = Utc::now();
    self.stores.document.update_user_state(user_id, &state, now).await?;

    let event = Event::new(
      EventType::UserStateUpdated,
      Some(user_id.clone()),
      serde_json::json!({"menu_context": state.menu_context}),
    );
    self.event_bus.publish(&topic_for(&EventType::UserStateUpdated), event).await?;
    Ok(())
  }

  pub async fn update_user_profile(&self, user_id: &UserId, patch: UserProfilePatch) -> Result<(), CoreError> {
    self
      .stores
      .relational
      .update_profile_fields(
        user_id,
        patch.username.as_deref(),
        patch.first_name.as_deref(),
        patch.last_name.as_deref(),
        patch.language_code.as_deref(),
        patch.is_active,
      )
      .await?;
    Ok(())
  }

  pub async fn delete_user(&self, user_id: &UserId) -> Result<(), CoreError> {
    self.stores.delete_user(user_id).await?;

    let event = Event::new(
      EventType::UserDeleted,
      Some(user_id.clone()),
      serde_json::json!({"user_id": user_id.to_string()}),
    );
    self.event_bus.publish(&topic_for(&EventType::UserDeleted), event).await?;
    Ok(())
  }
}
