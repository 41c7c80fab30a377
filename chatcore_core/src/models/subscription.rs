use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum PlanType {
  Free,
  Premium,
  Vip,
}

impl PlanType {
  pub fn as_str(&self) -> &'static str {
    match self {
      PlanType::Free => "free",
      PlanType::Premium => "premium",
      PlanType::Vip => "vip",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "free" => Some(PlanType::Free),
      "premium" => Some(PlanType::Premium),
      "vip" => Some(PlanType::Vip),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SubscriptionStatus {
  Active,
  Inactive,
  Cancelled,
  Expired,
}

impl SubscriptionStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      SubscriptionStatus::Active => "active",
      SubscriptionStatus::Inactive => "inactive",
      SubscriptionStatus::Cancelled => "cancelled",
      SubscriptionStatus::Expired => "expired",
    }
  }
}

/// A subscription record. Invariant S1: at most one record per
/// `user_id` is logically "current"; an expired-by-date active record
/// is transitioned to `Expired` on next read (see `check_expiry`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
  pub user_id: UserId,
  pub plan_type: PlanType,
  pub status: SubscriptionStatus,
  pub start_date: DateTime<Utc>,
  pub end_date: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
  pub fn new(user_id: UserId, plan_type: PlanType, duration_days: i64, now: DateTime<Utc>) -> Self {
    Self {
      user_id,
      plan_type,
      status: SubscriptionStatus::Active,
      start_date: now,
      end_date: Some(now + chrono::Duration::days(duration_days)),
      created_at: now,
      updated_at: now,
    }
  }

  /// Evaluate the ttl_check transition: an active record whose
  /// `end_date` has passed becomes `Expired`. Returns true if the
  /// status was changed (caller must persist).
  pub fn check_expiry(&mut self, now: DateTime<Utc>) -> bool {
    if self.status == SubscriptionStatus::Active {
      if let Some(end) = self.end_date {
        if end <= now {
          self.status = SubscriptionStatus::Expired;
          self.updated_at = now;
          return true;
        }
      }
    }
    false
  }

  pub fn is_currently_active(&self, now: DateTime<Utc>) -> bool {
    self.status == SubscriptionStatus::Active && self.end_date.map(|end| end > now).unwrap_or(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn expiry_exactly_at_end_date_transitions_to_expired() {
    let now = Utc::now();
    let mut sub = SubscriptionRecord::new(UserId::from("42"), PlanType::Premium, 30, now);
    sub.end_date = Some(now);
    assert!(sub.check_expiry(now));
    assert_eq!(sub.status, SubscriptionStatus::Expired);
    assert!(!sub.is_currently_active(now));
  }

  #[test]
  fn plan_round_trips_through_str() {
    assert_eq!(PlanType::parse("vip"), Some(PlanType::Vip));
    assert_eq!(PlanType::Vip.as_str(), "vip");
    assert_eq!(PlanType::parse("bogus"), None);
  }
}
