use std::sync::Arc;

use chatcore_core::error::CoreError;
use chatcore_core::event::{Event, EventType};
use chatcore_core::ids::UserId;
use chatcore_eventbus::EventBus;
use chatcore_services::topics::topic_for;
use chatcore_stores::StorePair;
use tracing::warn;

use crate::gamification_client::{GamificationClient, ItemEffects, NewItem};

const HINT_CATEGORY: &str = "collectible";
const HINT_ITEM_TYPE: &str = "narrative_hint";

/// Owns the `reaction_detected` -> `narrative_hint_unlocked` pipeline.
/// Hints themselves are read from the document store's dedicated
/// `hints` collection; unlocked hints are recorded as inventory items
/// in the external gamification service, not in either local store.
pub struct HintSystem {
  stores: Arc<StorePair>,
  event_bus: Arc<EventBus>,
  gamification: Arc<GamificationClient>,
}

impl HintSystem {
  pub fn new(stores: Arc<StorePair>, event_bus: Arc<EventBus>, gamification: Arc<GamificationClient>) -> Self {
    Self {
      stores,
      event_bus,
      gamification,
    }
  }

  /// Subscribes this hint system to `reaction_detected`. Call once
  /// after the event bus has connected.
  pub async fn subscribe(self: &Arc<Self>) {
    let this = Arc::clone(self);
    let handler: chatcore_eventbus::Handler = Arc::new(move |event: Event| {
      let this = Arc::clone(&this);
      Box::pin(async move { this.on_reaction_detected(event).await })
    });
    self
      .event_bus
      .subscribe(&topic_for(&EventType::ReactionDetected), "hint_system", handler)
      .await;
  }

  async fn on_reaction_detected(&self, event: Event) -> Result<(), CoreError> {
    let Some(user_id) = event.user_id.clone() else {
      return Ok(());
    };
    let content_id = event
      .payload
      .get("content_id")
      .and_then(|v| v.as_str())
      .unwrap_or_default()
      .to_string();
    let reaction_type = event
      .payload
      .get("reaction_type")
      .and_then(|v| v.as_str())
      .unwrap_or_default()
      .to_string();
    if content_id.is_empty() || reaction_type.is_empty() {
      return Ok(());
    }

    self.unlock_matching_hints(&user_id, &content_id, &reaction_type).await
  }

  /// Finds every hint whose unlock condition matches the given
  /// reaction and grants it. A hint already present in the user's
  /// mochila is not re-granted: checked via `get_user_items` before
  /// `post_item`, mirroring `unlock_hint()` in the original. A
  /// gamification API failure is logged and surfaced as
  /// `api_unavailable` without unwinding the triggering
  /// `reaction_detected` event — per design, a hint award failure
  /// never rolls back the reaction that caused it.
  pub async fn unlock_matching_hints(
    &self,
    user_id: &UserId,
    content_id: &str,
    reaction_type: &str,
  ) -> Result<(), CoreError> {
    let hints = self.stores.document.find_hints_by_trigger(content_id, reaction_type).await?;
    if hints.is_empty() {
      return Ok(());
    }

    let owned = self.gamification.get_user_items(user_id, Some(HINT_CATEGORY), Some(HINT_ITEM_TYPE)).await?;

    for hint in hints {
      let already_owned = owned.iter().any(|item| item.item_id == hint.hint_id.to_string());
      if already_owned {
        continue;
      }

      let item = NewItem {
        user_id: user_id.to_string(),
        item_id: hint.hint_id.to_string(),
        name: format!("hint:{}", hint.hint_id),
        description: hint.content.clone(),
        category: HINT_CATEGORY.to_string(),
        rarity: "common".to_string(),
        quantity: 1,
        effects: ItemEffects {
          effect_type: HINT_ITEM_TYPE.to_string(),
          hint_id: Some(hint.hint_id.to_string()),
          fragment_id: Some(hint.fragment_id.to_string()),
        },
        metadata: serde_json::json!({"unlock_condition": hint.unlock_condition}),
      };

      if let Err(e) = self.gamification.post_item(&item).await {
        warn!(%user_id, hint_id = %hint.hint_id, error = %e, "api_unavailable while storing unlocked hint");
        continue;
      }

      let unlocked = Event::new(
        EventType::NarrativeHintUnlocked,
        Some(user_id.clone()),
        serde_json::json!({"hint_id": hint.hint_id.to_string(), "fragment_id": hint.fragment_id.to_string()}),
      );
      self.event_bus.publish(&topic_for(&EventType::NarrativeHintUnlocked), unlocked).await?;
    }

    Ok(())
  }

  /// Lists the hint items a user currently owns, proxied from the
  /// gamification service.
  pub async fn get_user_hints(&self, user_id: &UserId) -> Result<Vec<crate::gamification_client::UserItem>, CoreError> {
    self
      .gamification
      .get_user_items(user_id, Some(HINT_CATEGORY), Some(HINT_ITEM_TYPE))
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn empty_payload_reaction_is_ignored() {
    let event = Event::new(EventType::ReactionDetected, Some(UserId::from("1")), serde_json::json!({}));
    assert!(event.payload.get("content_id").is_none());
  }
}
