use chatcore_core::error::CoreError;
use chatcore_core::ids::UserId;
use chatcore_core::models::{PlanType, SubscriptionRecord, SubscriptionStatus, UserProfile};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RelationalStoreConfig;
use crate::retry::ExponentialBackoffRetry;

const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Relational store: user profiles and subscriptions, row-level
/// access over a single SQLite file.
pub struct RelationalStore {
  pool: SqlitePool,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS user_profiles (
  user_id TEXT PRIMARY KEY,
  telegram_user_id INTEGER UNIQUE NOT NULL,
  username TEXT,
  first_name TEXT,
  last_name TEXT,
  language_code TEXT NOT NULL,
  registration_date TEXT NOT NULL,
  last_login TEXT NOT NULL,
  is_active INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS subscriptions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id TEXT NOT NULL,
  plan_type TEXT NOT NULL CHECK (plan_type IN ('free', 'premium', 'vip')),
  status TEXT NOT NULL CHECK (status IN ('active', 'inactive', 'cancelled', 'expired')),
  start_date TEXT NOT NULL,
  end_date TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_user_id ON subscriptions (user_id);
CREATE INDEX IF NOT EXISTS idx_subscriptions_status ON subscriptions (status);
"#;

impl RelationalStore {
  pub async fn connect_with_retry(config: &RelationalStoreConfig) -> Result<Self, CoreError> {
    let retry = ExponentialBackoffRetry::default();
    let path = config.database_path.clone();
    let max_connections = config.max_connections;

    let pool = retry
      .retry("relational_store.connect", || {
        let path = path.clone();
        async move {
          let options = SqliteConnectOptions::from_str(&path)
            .map_err(|e| CoreError::ConfigInvalid(format!("invalid SQLITE_DATABASE_PATH: {e}")))?
            .create_if_missing(true);
          let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(CoreError::from)?;
          Ok(pool)
        }
      })
      .await?;

    sqlx::query(SCHEMA).execute(&pool).await.map_err(CoreError::from)?;
    info!("relational store connected and migrated");
    Ok(Self { pool })
  }

  pub async fn ping(&self) -> Result<(), CoreError> {
    match tokio::time::timeout(PING_TIMEOUT, sqlx::query("SELECT 1").execute(&self.pool)).await {
      Ok(result) => result.map(|_| ()).map_err(CoreError::from),
      Err(_) => Err(CoreError::StoreUnavailable("relational store ping timed out".to_string())),
    }
  }

  pub async fn insert_profile(&self, profile: &UserProfile) -> Result<(), CoreError> {
    sqlx::query(
      "INSERT INTO user_profiles (user_id, telegram_user_id, username, first_name, last_name, language_code, registration_date, last_login, is_active) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(profile.user_id.to_string())
    .bind(profile.telegram_user_id.0)
    .bind(&profile.username)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(&profile.language_code)
    .bind(profile.registration_date.to_rfc3339())
    .bind(profile.last_login.to_rfc3339())
    .bind(profile.is_active)
    .execute(&self.pool)
    .await
    .map_err(CoreError::from)?;
    Ok(())
  }

  pub async fn get_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, CoreError> {
    let row = sqlx::query(
      "SELECT user_id, telegram_user_id, username, first_name, last_name, language_code, registration_date, last_login, is_active FROM user_profiles WHERE user_id = ?",
    )
    .bind(user_id.to_string())
    .fetch_optional(&self.pool)
    .await
    .map_err(CoreError::from)?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(profile_from_row(&row)?))
  }

  pub async fn update_last_login(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<(), CoreError> {
    let result = sqlx::query("UPDATE user_profiles SET last_login = ? WHERE user_id = ?")
      .bind(now.to_rfc3339())
      .bind(user_id.to_string())
      .execute(&self.pool)
      .await
      .map_err(CoreError::from)?;
    if result.rows_affected() == 0 {
      return Err(CoreError::NotFound(user_id.to_string()));
    }
    Ok(())
  }

  pub async fn update_profile_fields(
    &self,
    user_id: &UserId,
    username: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
    language_code: Option<&str>,
    is_active: Option<bool>,
  ) -> Result<(), CoreError> {
    let current = self
      .get_profile(user_id)
      .await?
      .ok_or_else(|| CoreError::NotFound(user_id.to_string()))?;

    let result = sqlx::query(
      "UPDATE user_profiles SET username = ?, first_name = ?, last_name = ?, language_code = ?, is_active = ? WHERE user_id = ?",
    )
    .bind(username.or(current.username.as_deref()))
    .bind(first_name.unwrap_or(&current.first_name))
    .bind(last_name.or(current.last_name.as_deref()))
    .bind(language_code.unwrap_or(&current.language_code))
    .bind(is_active.unwrap_or(current.is_active))
    .bind(user_id.to_string())
    .execute(&self.pool)
    .await
    .map_err(CoreError::from)?;

    if result.rows_affected() == 0 {
      return Err(CoreError::NotFound(user_id.to_string()));
    }
    Ok(())
  }

  pub async fn delete_profile(&self, user_id: &UserId) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM user_profiles WHERE user_id = ?")
      .bind(user_id.to_string())
      .execute(&self.pool)
      .await
      .map_err(CoreError::from)?;
    Ok(())
  }

  pub async fn insert_subscription(&self, record: &SubscriptionRecord) -> Result<i64, CoreError> {
    let result = sqlx::query(
      "INSERT INTO subscriptions (user_id, plan_type, status, start_date, end_date, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.user_id.to_string())
    .bind(record.plan_type.as_str())
    .bind(record.status.as_str())
    .bind(record.start_date.to_rfc3339())
    .bind(record.end_date.map(|d| d.to_rfc3339()))
    .bind(record.created_at.to_rfc3339())
    .bind(record.updated_at.to_rfc3339())
    .execute(&self.pool)
    .await
    .map_err(CoreError::from)?;
    Ok(result.last_insert_rowid())
  }

  /// Most recent subscription row for the user, if any.
  pub async fn get_latest_subscription(&self, user_id: &UserId) -> Result<Option<SubscriptionRecord>, CoreError> {
    let row = sqlx::query(
      "SELECT user_id, plan_type, status, start_date, end_date, created_at, updated_at FROM subscriptions WHERE user_id = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(user_id.to_string())
    .fetch_optional(&self.pool)
    .await
    .map_err(CoreError::from)?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(subscription_from_row(&row)?))
  }

  pub async fn update_subscription_status(
    &self,
    user_id: &UserId,
    status: SubscriptionStatus,
    now: DateTime<Utc>,
  ) -> Result<(), CoreError> {
    debug!(%user_id, status = status.as_str(), "persisting subscription status transition");
    let result = sqlx::query(
      "UPDATE subscriptions SET status = ?, updated_at = ? WHERE user_id = ? AND id = (SELECT id FROM subscriptions WHERE user_id = ? ORDER BY id DESC LIMIT 1)",
    )
    .bind(status.as_str())
    .bind(now.to_rfc3339())
    .bind(user_id.to_string())
    .bind(user_id.to_string())
    .execute(&self.pool)
    .await
    .map_err(CoreError::from)?;
    if result.rows_affected() == 0 {
      return Err(CoreError::NotFound(user_id.to_string()));
    }
    Ok(())
  }

  pub async fn update_subscription_plan(
    &self,
    user_id: &UserId,
    plan: PlanType,
    status: SubscriptionStatus,
    now: DateTime<Utc>,
  ) -> Result<(), CoreError> {
    let result = sqlx::query(
      "UPDATE subscriptions SET plan_type = ?, status = ?, updated_at = ? WHERE user_id = ? AND id = (SELECT id FROM subscriptions WHERE user_id = ? ORDER BY id DESC LIMIT 1)",
    )
    .bind(plan.as_str())
    .bind(status.as_str())
    .bind(now.to_rfc3339())
    .bind(user_id.to_string())
    .bind(user_id.to_string())
    .execute(&self.pool)
    .await
    .map_err(CoreError::from)?;
    if result.rows_affected() == 0 {
      return Err(CoreError::NotFound(user_id.to_string()));
    }
    Ok(())
  }

  pub async fn delete_subscriptions(&self, user_id: &UserId) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM subscriptions WHERE user_id = ?")
      .bind(user_id.to_string())
      .execute(&self.pool)
      .await
      .map_err(CoreError::from)?;
    Ok(())
  }
}

fn profile_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<UserProfile, CoreError> {
  use chatcore_core::ids::TelegramUserId;

  let registration_date: String = row.try_get("registration_date").map_err(CoreError::from)?;
  let last_login: String = row.try_get("last_login").map_err(CoreError::from)?;

  Ok(UserProfile {
    user_id: UserId::from(row.try_get::<String, _>("user_id").map_err(CoreError::from)?),
    telegram_user_id: TelegramUserId(row.try_get("telegram_user_id").map_err(CoreError::from)?),
    username: row.try_get("username").map_err(CoreError::from)?,
    first_name: row.try_get("first_name").map_err(CoreError::from)?,
    last_name: row.try_get("last_name").map_err(CoreError::from)?,
    language_code: row.try_get("language_code").map_err(CoreError::from)?,
    registration_date: parse_timestamp(&registration_date)?,
    last_login: parse_timestamp(&last_login)?,
    is_active: row.try_get("is_active").map_err(CoreError::from)?,
  })
}

fn subscription_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SubscriptionRecord, CoreError> {
  let plan_type: String = row.try_get("plan_type").map_err(CoreError::from)?;
  let status: String = row.try_get("status").map_err(CoreError::from)?;
  let start_date: String = row.try_get("start_date").map_err(CoreError::from)?;
  let end_date: Option<String> = row.try_get("end_date").map_err(CoreError::from)?;
  let created_at: String = row.try_get("created_at").map_err(CoreError::from)?;
  let updated_at: String = row.try_get("updated_at").map_err(CoreError::from)?;

  Ok(SubscriptionRecord {
    user_id: UserId::from(row.try_get::<String, _>("user_id").map_err(CoreError::from)?),
    plan_type: PlanType::parse(&plan_type)
      .ok_or_else(|| CoreError::DataInconsistency(format!("unknown plan_type {plan_type}")))?,
    status: parse_status(&status)?,
    start_date: parse_timestamp(&start_date)?,
    end_date: end_date.map(|d| parse_timestamp(&d)).transpose()?,
    created_at: parse_timestamp(&created_at)?,
    updated_at: parse_timestamp(&updated_at)?,
  })
}

fn parse_status(s: &str) -> Result<SubscriptionStatus, CoreError> {
  match s {
    "active" => Ok(SubscriptionStatus::Active),
    "inactive" => Ok(SubscriptionStatus::Inactive),
    "cancelled" => Ok(SubscriptionStatus::Cancelled),
    "expired" => Ok(SubscriptionStatus::Expired),
    other => Err(CoreError::DataInconsistency(format!("unknown subscription status {other}"))),
  }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, CoreError> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| CoreError::DataInconsistency(format!("malformed timestamp {s}: {e}")))
}
