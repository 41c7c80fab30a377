use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chatcore_core::error::CoreError;
use chatcore_core::event::{Event, EventType};
use chatcore_core::ids::{ChoiceId, FragmentId, UserId};
use chatcore_core::models::{BesitosTransactionType, PlanType};
use chatcore_eventbus::EventBus;
use chatcore_ordering::{DrainHandlerFuture, OrderingBuffer};
use chatcore_services::topics::topic_for;
use chatcore_services::{NarrativeService, SubscriptionService, UserService, VIPChecker};
use chatcore_stores::StorePair;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

/// Events drained per call to `process_user_interaction`. A single
/// user rarely has more than a handful of interactions in flight; this
/// just bounds one coordinator call from draining forever if a buffer
/// somehow backed up.
const INTERACTION_DRAIN_BATCH: usize = 25;

/// Reaction types that earn the reactor a besito, per §4.G.
const REWARDED_REACTIONS: [&str; 3] = ["like", "love", "besito"];

/// The action-specific payload carried by a `user_interaction` event.
/// This is what the Ordering Buffer's drain handler pattern-matches
/// on to decide which service(s) to call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InteractionAction {
  Start,
  Narrative {
    fragment_id: FragmentId,
    choice_id: Option<ChoiceId>,
  },
  Subscription {
    plan: PlanType,
  },
  Reaction {
    content_id: String,
    reaction_type: String,
  },
}

/// Outcome of a besitos mutation: `store_failure` surfaces as `Err`,
/// everything else is one of these two variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BesitosOutcome {
  Ok,
  InsufficientFunds,
}

/// The orchestrator: turns chat interactions into workflows by
/// composing the User/Subscription/Narrative services, the Store
/// Pair, the Event Bus, and the Ordering Buffer. Owns the per-user
/// besitos lock (Invariant U2) and the Ordering Buffer itself, which
/// are the only process-wide mutable state besides the bus's local
/// queue (§5).
pub struct Coordinator {
  stores: Arc<StorePair>,
  event_bus: Arc<EventBus>,
  buffer: Arc<OrderingBuffer>,
  user_service: Arc<UserService>,
  subscription_service: Arc<SubscriptionService>,
  narrative_service: Arc<NarrativeService>,
  besitos_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl Coordinator {
  /// Builds the Coordinator together with the NarrativeService it
  /// hands a VIPChecker to, resolving the cyclic reference that
  /// design note §9 calls out (Coordinator -> Narrative -> Coordinator)
  /// without a true `Arc` cycle: the checker handed to NarrativeService
  /// holds only a `Weak` back-reference, upgraded per call.
  pub fn new(
    stores: Arc<StorePair>,
    event_bus: Arc<EventBus>,
    buffer: Arc<OrderingBuffer>,
    user_service: Arc<UserService>,
    subscription_service: Arc<SubscriptionService>,
  ) -> Arc<Self> {
    Arc::new_cyclic(|weak: &Weak<Coordinator>| {
      let vip_checker: Arc<dyn VIPChecker> = Arc::new(WeakVipChecker(weak.clone()));
      let narrative_service = Arc::new(NarrativeService::new(stores.clone(), event_bus.clone(), vip_checker));
      Coordinator {
        stores,
        event_bus,
        buffer,
        user_service,
        subscription_service,
        narrative_service,
        besitos_locks: DashMap::new(),
      }
    })
  }

  pub fn user_service(&self) -> &Arc<UserService> {
    &self.user_service
  }

  pub fn subscription_service(&self) -> &Arc<SubscriptionService> {
    &self.subscription_service
  }

  pub fn narrative_service(&self) -> &Arc<NarrativeService> {
    &self.narrative_service
  }

  pub fn buffer(&self) -> &Arc<OrderingBuffer> {
    &self.buffer
  }

  /// Adds a `user_interaction` event to the user's Ordering Buffer,
  /// then immediately drains it. Because the buffer serializes per
  /// user, two near-simultaneous calls for the same user are still
  /// applied in timestamp order even though this method itself may be
  /// invoked concurrently from many tasks (§4.G buffer integration).
  pub async fn process_user_interaction(
    self: &Arc<Self>,
    user_id: UserId,
    action: InteractionAction,
  ) -> Result<serde_json::Value, CoreError> {
    let payload = serde_json::to_value(&action).map_err(|e| CoreError::Validation(e.to_string()))?;
    let event = Event::new(EventType::UserInteraction, Some(user_id.clone()), payload);
    self.buffer.add(user_id.clone(), event).await;

    let this = Arc::clone(self);
    let handler_user_id = user_id.clone();
    let processed = self
      .buffer
      .drain(&user_id, INTERACTION_DRAIN_BATCH, move |event| {
        let this = Arc::clone(&this);
        let user_id = handler_user_id.clone();
        let fut: DrainHandlerFuture<'static> = Box::pin(async move { this.dispatch_interaction(user_id, event).await });
        fut
      })
      .await;

    Ok(serde_json::json!({"user_id": user_id.to_string(), "processed": processed}))
  }

  async fn dispatch_interaction(&self, user_id: UserId, event: Event) -> Result<(), CoreError> {
    let action: InteractionAction =
      serde_json::from_value(event.payload.clone()).map_err(|e| CoreError::EventProcessingFailed(e.to_string()))?;

    match action {
      InteractionAction::Start => self.handle_start(&user_id).await,
      InteractionAction::Narrative { fragment_id, choice_id } => {
        self.narrative_service.update_progress(&user_id, fragment_id, choice_id).await
      }
      InteractionAction::Subscription { plan } => {
        self.subscription_service.upgrade_subscription(&user_id, plan).await.map(|_| ())
      }
      InteractionAction::Reaction { content_id, reaction_type } => {
        self.process_reaction(&user_id, content_id, reaction_type).await
      }
    }
  }

  /// Resets a returning user to the main menu and stamps session
  /// last-activity, mirroring the `/start` cold-start behavior at
  /// §8 scenario 1 without re-running the create path (the user
  /// already exists by the time a buffered `start` action drains).
  async fn handle_start(&self, user_id: &UserId) -> Result<(), CoreError> {
    let Some(context) = self.user_service.get_user_context(user_id).await? else {
      return Err(CoreError::NotFound(user_id.to_string()));
    };
    let mut state = context.document.current_state;
    state.menu_context = "main_menu".to_string();
    state.session.last_activity = Some(chrono::Utc::now());
    self.user_service.update_user_state(user_id, state).await
  }

  /// Composes Subscription.check + plan_type == vip, the capability
  /// NarrativeService depends on through the `VIPChecker` interface.
  pub async fn validate_vip_access(&self, user_id: &UserId) -> Result<bool, CoreError> {
    if !self.subscription_service.check_subscription_status(user_id).await? {
      return Ok(false);
    }
    let plan = self.stores.relational.get_latest_subscription(user_id).await?;
    Ok(plan.map(|record| record.plan_type == PlanType::Vip).unwrap_or(false))
  }

  /// Atomic currency mutation in the document store: read balance,
  /// validate for debit types, write the new balance, all under a
  /// per-user lock so concurrent transactions on the same user never
  /// race past Invariant U2.
  pub async fn process_besitos_transaction(
    &self,
    user_id: &UserId,
    delta: i64,
    transaction_type: BesitosTransactionType,
    description: impl Into<String>,
  ) -> Result<BesitosOutcome, CoreError> {
    let description = description.into();
    let lock = self
      .besitos_locks
      .entry(user_id.clone())
      .or_insert_with(|| Arc::new(Mutex::new(())))
      .clone();
    let _guard = lock.lock().await;

    let document = self
      .stores
      .document
      .find_user(user_id)
      .await?
      .ok_or_else(|| CoreError::NotFound(user_id.to_string()))?;
    let new_balance = document.besitos_balance + delta;

    if transaction_type.is_debit() && new_balance < 0 {
      return Ok(BesitosOutcome::InsufficientFunds);
    }

    self.stores.document.update_besitos_balance(user_id, new_balance).await?;

    let event = Event::new(
      EventType::BesitosTransaction,
      Some(user_id.clone()),
      serde_json::json!({
        "delta": delta,
        "type": transaction_type.as_str(),
        "description": description,
        "new_balance": new_balance,
      }),
    );
    self.event_bus.publish(&topic_for(&EventType::BesitosTransaction), event).await?;

    if delta > 0 && transaction_type == BesitosTransactionType::Reward {
      let awarded = Event::new(
        EventType::BesitosAwarded,
        Some(user_id.clone()),
        serde_json::json!({"amount": delta}),
      );
      self.event_bus.publish(&topic_for(&EventType::BesitosAwarded), awarded).await?;
    }

    Ok(BesitosOutcome::Ok)
  }

  /// Publishes `reaction_detected` and, for a rewarded reaction type,
  /// schedules the +1 besitos reward transaction. The Hint helper
  /// listens for `reaction_detected` independently to unlock pistas;
  /// that subscription is not invoked synchronously from here.
  pub async fn process_reaction(
    &self,
    user_id: &UserId,
    content_id: impl Into<String>,
    reaction_type: impl Into<String>,
  ) -> Result<(), CoreError> {
    let content_id = content_id.into();
    let reaction_type = reaction_type.into();

    let event = Event::new(
      EventType::ReactionDetected,
      Some(user_id.clone()),
      serde_json::json!({"content_id": content_id, "reaction_type": reaction_type}),
    );
    self.event_bus.publish(&topic_for(&EventType::ReactionDetected), event).await?;

    if REWARDED_REACTIONS.contains(&reaction_type.as_str()) {
      let outcome = self
        .process_besitos_transaction(user_id, 1, BesitosTransactionType::Reward, format!("reaction:{reaction_type}"))
        .await?;
      if outcome == BesitosOutcome::InsufficientFunds {
        warn!(%user_id, "unexpected insufficient_funds on a reward credit");
      }
    }

    Ok(())
  }
}

#[async_trait]
impl VIPChecker for Coordinator {
  async fn is_vip(&self, user_id: &UserId) -> Result<bool, CoreError> {
    self.validate_vip_access(user_id).await
  }
}

/// Weak-referencing adapter handed to `NarrativeService` so the
/// Coordinator<->Narrative dependency never forms a strong `Arc`
/// cycle (which would leak both forever). See `Coordinator::new`.
struct WeakVipChecker(Weak<Coordinator>);

#[async_trait]
impl VIPChecker for WeakVipChecker {
  async fn is_vip(&self, user_id: &UserId) -> Result<bool, CoreError> {
    match self.0.upgrade() {
      Some(coordinator) => coordinator.validate_vip_access(user_id).await,
      None => Err(CoreError::Internal("coordinator dropped before VIP check".to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interaction_action_round_trips_through_json() {
    let action = InteractionAction::Narrative {
      fragment_id: FragmentId::from("f1"),
      choice_id: Some(ChoiceId("c1".to_string())),
    };
    let value = serde_json::to_value(&action).unwrap();
    assert_eq!(value["action"], "narrative");
    let parsed: InteractionAction = serde_json::from_value(value).unwrap();
    match parsed {
      InteractionAction::Narrative { fragment_id, .. } => assert_eq!(fragment_id, FragmentId::from("f1")),
      other => panic!("unexpected variant: {other:?}"),
    }
  }
}
