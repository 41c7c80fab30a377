use std::time::Duration;

use chatcore_core::error::CoreError;
use chatcore_core::ids::UserId;
use serde::{Deserialize, Serialize};
use tracing::warn;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct ItemEffects {
  #[serde(rename = "type")]
  pub effect_type: String,
  pub hint_id: Option<String>,
  pub fragment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewItem {
  pub user_id: String,
  pub item_id: String,
  pub name: String,
  pub description: String,
  pub category: String,
  pub rarity: String,
  pub quantity: u32,
  pub effects: ItemEffects,
  pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserItem {
  pub item_id: String,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(flatten)]
  pub rest: serde_json::Value,
}

/// Outbound HTTP client for the gamification sub-module: reward items
/// (hints, besitos collectibles) are stored there, not in either of
/// this core's own stores. Network failures surface as
/// `api_unavailable`; callers continue processing the event that
/// triggered the call regardless.
pub struct GamificationClient {
  http: reqwest::Client,
  base_url: String,
}

impl GamificationClient {
  pub fn new(base_url: impl Into<String>) -> Self {
    let http = reqwest::Client::builder()
      .timeout(HTTP_TIMEOUT)
      .build()
      .unwrap_or_else(|_| reqwest::Client::new());
    Self {
      http,
      base_url: base_url.into(),
    }
  }

  pub async fn post_item(&self, item: &NewItem) -> Result<(), CoreError> {
    let url = format!("{}/items", self.base_url);
    let response = self.http.post(&url).json(item).send().await.map_err(|e| {
      warn!(%url, error = %e, "gamification API unreachable");
      CoreError::ApiUnavailable(e.to_string())
    })?;

    if response.status().is_success() {
      Ok(())
    } else {
      Err(CoreError::ApiUnavailable(format!("gamification API returned {}", response.status())))
    }
  }

  pub async fn get_user_items(
    &self,
    user_id: &UserId,
    category: Option<&str>,
    item_type: Option<&str>,
  ) -> Result<Vec<UserItem>, CoreError> {
    let url = format!("{}/users/{}/items", self.base_url, user_id);
    let mut query = Vec::new();
    if let Some(category) = category {
      query.push(("category", category));
    }
    if let Some(item_type) = item_type {
      query.push(("type", item_type));
    }

    let response = self.http.get(&url).query(&query).send().await.map_err(|e| {
      warn!(%url, error = %e, "gamification API unreachable");
      CoreError::ApiUnavailable(e.to_string())
    })?;

    if !response.status().is_success() {
      return Err(CoreError::ApiUnavailable(format!("gamification API returned {}", response.status())));
    }

    response.json::<Vec<UserItem>>().await.map_err(|e| CoreError::ApiUnavailable(e.to_string()))
  }
}
