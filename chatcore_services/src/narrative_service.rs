use std::sync::Arc;

use chatcore_core::error::CoreError;
use chatcore_core::event::{Event, EventType};
use chatcore_core::ids::{ChoiceId, FragmentId, UserId};
use chatcore_core::models::{NarrativeFragment, NarrativeProgress, ViewHistoryEntry};
use chatcore_eventbus::EventBus;
use chatcore_stores::StorePair;
use chrono::Utc;

use crate::topics::topic_for;
use crate::vip_checker::VIPChecker;

/// Fetches content fragments, advances per-user progress, enforces
/// premium-tier gating, and tracks views. Owns `NarrativeFragment` +
/// the embedded `NarrativeProgress`; other services read-only.
pub struct NarrativeService {
  stores: Arc<StorePair>,
  event_bus: Arc<EventBus>,
  vip_checker: Arc<dyn VIPChecker>,
}

impl NarrativeService {
  pub fn new(stores: Arc<StorePair>, event_bus: Arc<EventBus>, vip_checker: Arc<dyn VIPChecker>) -> Self {
    Self {
      stores,
      event_bus,
      vip_checker,
    }
  }

  /// DS lookup by id; VIP-gated fragments require a known, VIP user.
  pub async fn get_fragment(&self, fragment_id: &FragmentId, user_id: Option<&UserId>) -> Result<NarrativeFragment, CoreError> {
    let fragment = self
      .stores
      .document
      .find_fragment(fragment_id)
      .await?
      .ok_or_else(|| CoreError::NotFound(fragment_id.to_string()))?;

    if fragment.vip_required {
      let Some(user_id) = user_id else {
        return Err(CoreError::VipAccessRequired);
      };
      if !self.vip_checker.is_vip(user_id).await? {
        return Err(CoreError::VipAccessRequired);
      }
    }

    if let Some(user_id) = user_id {
      let event = Event::new(
        EventType::NarrativeFragmentAccessed,
        Some(user_id.clone()),
        serde_json::json!({"fragment_id": fragment_id.to_string()}),
      );
      self
        .event_bus
        .publish(&topic_for(&EventType::NarrativeFragmentAccessed), event)
        .await?;
    }

    Ok(fragment)
  }

  pub async fn get_user_progress(&self, user_id: &UserId) -> Result<NarrativeProgress, CoreError> {
    let document = self
      .stores
      .document
      .find_user(user_id)
      .await?
      .ok_or_else(|| CoreError::NotFound(user_id.to_string()))?;
    Ok(document.current_state.narrative_progress)
  }

  /// Validates checkpoint unlock conditions (if any), advances
  /// progress, persists, and emits the corresponding events.
  pub async fn update_progress(
    &self,
    user_id: &UserId,
    next_fragment_id: FragmentId,
    choice_id: Option<ChoiceId>,
  ) -> Result<(), CoreError> {
    let now = Utc::now();
    let document = self
      .stores
      .document
      .find_user(user_id)
      .await?
      .ok_or_else(|| CoreError::NotFound(user_id.to_string()))?;
    let mut progress = document.current_state.narrative_progress;

    let target_fragment = self.stores.document.find_fragment(&next_fragment_id).await?;
    let is_checkpoint = target_fragment.as_ref().map(|f| f.metadata.is_checkpoint).unwrap_or(false);

    if let Some(fragment) = &target_fragment {
      if fragment.metadata.is_checkpoint {
        if let Some(conditions) = &fragment.metadata.unlock_conditions {
          let fragments_met = conditions
            .required_completed_fragments
            .iter()
            .all(|f| progress.has_visited(f));
          let choices_met = conditions
            .required_choices
            .iter()
            .all(|(fragment, choice)| progress.choices_made.get(fragment) == Some(choice));
          if !fragments_met || !choices_met {
            return Err(CoreError::ProgressionDenied(next_fragment_id.to_string()));
          }
        }
      }
    }

    progress.advance(next_fragment_id.clone(), choice_id, now);

    let mut state = document.current_state.clone();
    state.narrative_progress = progress;
    self.stores.document.update_user_state(user_id, &state, now).await?;

    let event = Event::new(
      EventType::NarrativeProgressUpdated,
      Some(user_id.clone()),
      serde_json::json!({"current_fragment": next_fragment_id.to_string()}),
    );
    self.event_bus.publish(&topic_for(&EventType::NarrativeProgressUpdated), event).await?;

    if is_checkpoint {
      let checkpoint_event = Event::new(
        EventType::NarrativeCheckpointReached,
        Some(user_id.clone()),
        serde_json::json!({"fragment_id": next_fragment_id.to_string()}),
      );
      self
        .event_bus
        .publish(&topic_for(&EventType::NarrativeCheckpointReached), checkpoint_event)
        .await?;
    }

    Ok(())
  }

  pub async fn track_content_view(
    &self,
    user_id: &UserId,
    content_id: impl Into<String>,
    content_type: impl Into<String>,
  ) -> Result<(), CoreError> {
    let now = Utc::now();
    let content_id = content_id.into();
    let entry = ViewHistoryEntry {
      content_id: content_id.clone(),
      content_type: content_type.into(),
      viewed_at: now,
    };
    self.stores.document.record_view(user_id, &entry).await?;

    let event = Event::new(
      EventType::ContentViewed,
      Some(user_id.clone()),
      serde_json::json!({"content_id": content_id}),
    );
    self.event_bus.publish(&topic_for(&EventType::ContentViewed), event).await?;
    Ok(())
  }
}
