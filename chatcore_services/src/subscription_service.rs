use std::sync::Arc;

use chatcore_core::error::CoreError;
use chatcore_core::event::{Event, EventType};
use chatcore_core::ids::UserId;
use chatcore_core::models::{PlanType, SubscriptionRecord, SubscriptionStatus};
use chatcore_eventbus::EventBus;
use chatcore_stores::StorePair;
use chrono::Utc;

use crate::topics::topic_for;

const DEFAULT_DURATION_DAYS: i64 = 30;

/// CRUD over subscription records with expiry evaluation. Owns the
/// `subscriptions` table; other services read it read-only.
pub struct SubscriptionService {
  stores: Arc<StorePair>,
  event_bus: Arc<EventBus>,
}

impl SubscriptionService {
  pub fn new(stores: Arc<StorePair>, event_bus: Arc<EventBus>) -> Self {
    Self { stores, event_bus }
  }

  /// Idempotent on an existing active record: returns it unchanged
  /// rather than creating a second one.
  pub async fn create_subscription(
    &self,
    user_id: &UserId,
    plan: PlanType,
    duration_days: Option<i64>,
  ) -> Result<SubscriptionRecord, CoreError> {
    let now = Utc::now();
    if let Some(mut existing) = self.stores.relational.get_latest_subscription(user_id).await? {
      existing.check_expiry(now);
      if existing.is_currently_active(now) {
        return Ok(existing);
      }
    }

    let record = SubscriptionRecord::new(
      user_id.clone(),
      plan,
      duration_days.unwrap_or(DEFAULT_DURATION_DAYS),
      now,
    );
    self.stores.relational.insert_subscription(&record).await?;

    let event = Event::new(
      EventType::SubscriptionCreated,
      Some(user_id.clone()),
      serde_json::json!({"plan_type": record.plan_type.as_str()}),
    );
    self.event_bus.publish(&topic_for(&EventType::SubscriptionCreated), event).await?;

    Ok(record)
  }

  /// Performs the ttl_check transition and persists it before
  /// reporting whether the subscription is currently active.
  pub async fn check_subscription_status(&self, user_id: &UserId) -> Result<bool, CoreError> {
    let now = Utc::now();
    let Some(mut record) = self.stores.relational.get_latest_subscription(user_id).await? else {
      return Ok(false);
    };

    if record.check_expiry(now) {
      self
        .stores
        .relational
        .update_subscription_status(user_id, SubscriptionStatus::Expired, now)
        .await?;
    }

    Ok(record.is_currently_active(now))
  }

  /// Creates a subscription from scratch if none exists; otherwise
  /// reactivates with the new plan.
  pub async fn upgrade_subscription(&self, user_id: &UserId, new_plan: PlanType) -> Result<SubscriptionRecord, CoreError> {
    let now = Utc::now();
    let Some(mut existing) = self.stores.relational.get_latest_subscription(user_id).await? else {
      return self.create_subscription(user_id, new_plan, None).await;
    };

    self
      .stores
      .relational
      .update_subscription_plan(user_id, new_plan, SubscriptionStatus::Active, now)
      .await?;
    existing.plan_type = new_plan;
    existing.status = SubscriptionStatus::Active;
    existing.updated_at = now;

    let event = Event::new(
      EventType::SubscriptionUpgraded,
      Some(user_id.clone()),
      serde_json::json!({"plan_type": existing.plan_type.as_str()}),
    );
    self.event_bus.publish(&topic_for(&EventType::SubscriptionUpgraded), event).await?;

    Ok(existing)
  }

  pub async fn cancel_subscription(&self, user_id: &UserId) -> Result<(), CoreError> {
    let now = Utc::now();
    self
      .stores
      .relational
      .update_subscription_status(user_id, SubscriptionStatus::Cancelled, now)
      .await?;

    let event = Event::new(
      EventType::SubscriptionUpdated,
      Some(user_id.clone()),
      serde_json::json!({"status": "cancelled"}),
    );
    self.event_bus.publish(&topic_for(&EventType::SubscriptionUpdated), event).await?;
    Ok(())
  }
}
