use chatcore_core::ids::{TelegramUserId, UserId};
use chatcore_core::models::{PlanType, SubscriptionRecord, UserProfile};
use chatcore_stores::config::RelationalStoreConfig;
use chatcore_stores::relational_store::RelationalStore;
use chrono::Utc;

async fn in_memory_store() -> RelationalStore {
  let config = RelationalStoreConfig {
    database_path: "sqlite::memory:".to_string(),
    max_connections: 1,
    connect_timeout_secs: 5,
  };
  RelationalStore::connect_with_retry(&config).await.unwrap()
}

fn profile(user_id: &str, telegram_id: i64) -> UserProfile {
  UserProfile::new_default(
    UserId::from(user_id),
    TelegramUserId(telegram_id),
    Some("ana".to_string()),
    "Ana".to_string(),
    None,
    "es".to_string(),
    Utc::now(),
  )
}

/// Cold-start registration's relational half: insert then read back
/// the same profile, exercising the scenario 1 happy path for this
/// store in isolation from the document store.
#[tokio::test]
async fn insert_and_read_profile_round_trips() {
  let store = in_memory_store().await;
  let p = profile("1", 111);
  store.insert_profile(&p).await.unwrap();

  let fetched = store.get_profile(&UserId::from("1")).await.unwrap().unwrap();
  assert_eq!(fetched.username.as_deref(), Some("ana"));
  assert_eq!(fetched.telegram_user_id.0, 111);
}

/// A duplicate `telegram_user_id` violates the table's UNIQUE
/// constraint — the real failure `create_user_atomic`'s compensation
/// branch reacts to in scenario 6, reproduced here without a live
/// document store.
#[tokio::test]
async fn duplicate_telegram_user_id_fails_relational_insert() {
  let store = in_memory_store().await;
  store.insert_profile(&profile("1", 222)).await.unwrap();

  let err = store.insert_profile(&profile("2", 222)).await.unwrap_err();
  assert!(!err.is_retryable());
}

/// Only the fields supplied in a patch are overwritten; the rest of
/// the row is read back unchanged.
#[tokio::test]
async fn update_profile_fields_only_touches_supplied_fields() {
  let store = in_memory_store().await;
  store.insert_profile(&profile("1", 333)).await.unwrap();

  store
    .update_profile_fields(&UserId::from("1"), None, None, Some("Lopez"), None, None)
    .await
    .unwrap();

  let fetched = store.get_profile(&UserId::from("1")).await.unwrap().unwrap();
  assert_eq!(fetched.last_name.as_deref(), Some("Lopez"));
  assert_eq!(fetched.username.as_deref(), Some("ana"));
  assert_eq!(fetched.first_name, "Ana");
}

/// A subscription insert is immediately visible via
/// `get_latest_subscription`, the read path `validate_vip_access`
/// depends on.
#[tokio::test]
async fn latest_subscription_reflects_most_recent_insert() {
  let store = in_memory_store().await;
  let user_id = UserId::from("1");
  let now = Utc::now();

  store.insert_subscription(&SubscriptionRecord::new(user_id.clone(), PlanType::Premium, 30, now)).await.unwrap();
  store.insert_subscription(&SubscriptionRecord::new(user_id.clone(), PlanType::Vip, 30, now)).await.unwrap();

  let latest = store.get_latest_subscription(&user_id).await.unwrap().unwrap();
  assert_eq!(latest.plan_type, PlanType::Vip);
}
