use std::time::Duration;

use chatcore_core::error::CoreError;
use chatcore_core::ids::{FragmentId, HintId, UserId};
use chatcore_core::models::{CurrentState, HintDefinition, Message, NarrativeFragment, UserDocument, ViewHistoryEntry};
use chrono::Utc;
use mongodb::bson::{doc, to_bson, to_document};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{debug, info};

use crate::config::DocumentStoreConfig;
use crate::retry::ExponentialBackoffRetry;

const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Document store: dynamic per-user state and narrative content. Each
/// user is one document in `users`; content fragments live in
/// `narrative_fragments` and are treated as read-only by this crate.
pub struct DocumentStore {
  database: Database,
}

impl DocumentStore {
  pub async fn connect_with_retry(config: &DocumentStoreConfig) -> Result<Self, CoreError> {
    let retry = ExponentialBackoffRetry::default();
    let uri = config.uri.clone();
    let db_name = config.database.clone();
    let min_pool = config.min_pool_size;
    let max_pool = config.max_pool_size;
    let timeout = config.connect_timeout();

    let database = retry
      .retry("document_store.connect", || {
        let uri = uri.clone();
        let db_name = db_name.clone();
        async move {
          let mut options = ClientOptions::parse(&uri)
            .await
            .map_err(|e| CoreError::ConfigInvalid(format!("invalid MONGODB_URI: {e}")))?;
          options.min_pool_size = Some(min_pool);
          options.max_pool_size = Some(max_pool);
          options.connect_timeout = Some(timeout);
          let client = Client::with_options(options)
            .map_err(|e| CoreError::ConfigInvalid(format!("invalid mongo client options: {e}")))?;
          let database = client.database(&db_name);
          database
            .run_command(doc! {"ping": 1})
            .await
            .map_err(CoreError::from)?;
          Ok(database)
        }
      })
      .await?;

    info!("document store connected");
    Ok(Self { database })
  }

  pub async fn ping(&self) -> Result<(), CoreError> {
    match tokio::time::timeout(PING_TIMEOUT, self.database.run_command(doc! {"ping": 1})).await {
      Ok(result) => result.map(|_| ()).map_err(CoreError::from),
      Err(_) => Err(CoreError::StoreUnavailable("document store ping timed out".to_string())),
    }
  }

  fn users(&self) -> Collection<UserDocument> {
    self.database.collection("users")
  }

  fn fragments(&self) -> Collection<NarrativeFragment> {
    self.database.collection("narrative_fragments")
  }

  fn hints(&self) -> Collection<HintDefinition> {
    self.database.collection("hints")
  }

  fn messages(&self) -> Collection<Message> {
    self.database.collection("messages")
  }

  /// Create indexes for the common query patterns this core relies
  /// on. Idempotent: safe to call on every startup.
  pub async fn initialize_collections(&self) -> Result<(), CoreError> {
    debug!("initializing document store indexes");

    let users_indexes = vec![
      IndexModel::builder()
        .keys(doc! {"user_id": 1})
        .options(IndexOptions::builder().unique(true).build())
        .build(),
      IndexModel::builder()
        .keys(doc! {"current_state.narrative_progress.current_fragment": 1})
        .build(),
      IndexModel::builder().keys(doc! {"preferences.language": 1}).build(),
      IndexModel::builder().keys(doc! {"created_at": 1}).build(),
      IndexModel::builder().keys(doc! {"updated_at": 1}).build(),
    ];
    self.users().create_indexes(users_indexes).await.map_err(CoreError::from)?;

    let fragment_indexes = vec![
      IndexModel::builder()
        .keys(doc! {"fragment_id": 1})
        .options(IndexOptions::builder().unique(true).build())
        .build(),
      IndexModel::builder().keys(doc! {"metadata.tags": 1}).build(),
      IndexModel::builder().keys(doc! {"vip_required": 1}).build(),
    ];
    self
      .fragments()
      .create_indexes(fragment_indexes)
      .await
      .map_err(CoreError::from)?;

    let hint_indexes = vec![
      IndexModel::builder()
        .keys(doc! {"hint_id": 1})
        .options(IndexOptions::builder().unique(true).build())
        .build(),
      IndexModel::builder()
        .keys(doc! {
          "unlock_condition.trigger": 1,
          "unlock_condition.content_id": 1,
          "unlock_condition.reaction_type": 1,
        })
        .build(),
    ];
    self.hints().create_indexes(hint_indexes).await.map_err(CoreError::from)?;

    let message_indexes = vec![
      IndexModel::builder()
        .keys(doc! {"message_id": 1})
        .options(IndexOptions::builder().unique(true).build())
        .build(),
      IndexModel::builder().keys(doc! {"status": 1, "scheduled_time": 1}).build(),
    ];
    self.messages().create_indexes(message_indexes).await.map_err(CoreError::from)?;

    Ok(())
  }

  pub async fn insert_user(&self, document: &UserDocument) -> Result<(), CoreError> {
    self.users().insert_one(document).await.map_err(|e| {
      if e.to_string().contains("E11000") {
        CoreError::Duplicate(document.user_id.to_string())
      } else {
        CoreError::from(e)
      }
    })?;
    Ok(())
  }

  pub async fn find_user(&self, user_id: &UserId) -> Result<Option<UserDocument>, CoreError> {
    self
      .users()
      .find_one(doc! {"user_id": user_id.to_string()})
      .await
      .map_err(CoreError::from)
  }

  pub async fn update_user_state(
    &self,
    user_id: &UserId,
    state: &CurrentState,
    now: chrono::DateTime<Utc>,
  ) -> Result<(), CoreError> {
    let state_doc = to_document(state).map_err(|e| CoreError::Validation(e.to_string()))?;
    let now_bson = to_bson(&now).map_err(|e| CoreError::Validation(e.to_string()))?;
    let result = self
      .users()
      .update_one(
        doc! {"user_id": user_id.to_string()},
        doc! {"$set": {"current_state": state_doc, "updated_at": now_bson}},
      )
      .await
      .map_err(CoreError::from)?;
    if result.matched_count == 0 {
      return Err(CoreError::NotFound(user_id.to_string()));
    }
    Ok(())
  }

  pub async fn update_besitos_balance(&self, user_id: &UserId, new_balance: i64) -> Result<(), CoreError> {
    let result = self
      .users()
      .update_one(
        doc! {"user_id": user_id.to_string()},
        doc! {"$set": {"besitos_balance": new_balance}},
      )
      .await
      .map_err(CoreError::from)?;
    if result.matched_count == 0 {
      return Err(CoreError::NotFound(user_id.to_string()));
    }
    Ok(())
  }

  pub async fn record_view(&self, user_id: &UserId, entry: &ViewHistoryEntry) -> Result<(), CoreError> {
    let entry_doc = to_bson(entry).map_err(|e| CoreError::Validation(e.to_string()))?;
    let result = self
      .users()
      .update_one(
        doc! {"user_id": user_id.to_string()},
        doc! {"$push": {"view_history": entry_doc}},
      )
      .await
      .map_err(CoreError::from)?;
    if result.matched_count == 0 {
      return Err(CoreError::NotFound(user_id.to_string()));
    }
    Ok(())
  }

  pub async fn delete_user(&self, user_id: &UserId) -> Result<(), CoreError> {
    self
      .users()
      .delete_one(doc! {"user_id": user_id.to_string()})
      .await
      .map_err(CoreError::from)?;
    Ok(())
  }

  pub async fn find_fragment(&self, fragment_id: &FragmentId) -> Result<Option<NarrativeFragment>, CoreError> {
    self
      .fragments()
      .find_one(doc! {"fragment_id": fragment_id.to_string()})
      .await
      .map_err(CoreError::from)
  }

  pub async fn insert_fragment(&self, fragment: &NarrativeFragment) -> Result<(), CoreError> {
    self.fragments().insert_one(fragment).await.map_err(CoreError::from)?;
    Ok(())
  }

  pub async fn find_hint(&self, hint_id: &HintId) -> Result<Option<HintDefinition>, CoreError> {
    self.hints().find_one(doc! {"hint_id": hint_id.to_string()}).await.map_err(CoreError::from)
  }

  pub async fn insert_hint(&self, hint: &HintDefinition) -> Result<(), CoreError> {
    self.hints().insert_one(hint).await.map_err(CoreError::from)?;
    Ok(())
  }

  pub async fn find_hints_by_trigger(&self, content_id: &str, reaction_type: &str) -> Result<Vec<HintDefinition>, CoreError> {
    use futures::TryStreamExt;
    let mut cursor = self
      .hints()
      .find(doc! {
        "unlock_condition.trigger": "reaction",
        "unlock_condition.content_id": content_id,
        "unlock_condition.reaction_type": reaction_type,
      })
      .await
      .map_err(CoreError::from)?;
    let mut results = Vec::new();
    while let Some(hint) = cursor.try_next().await.map_err(CoreError::from)? {
      results.push(hint);
    }
    Ok(results)
  }

  pub async fn insert_message(&self, message: &Message) -> Result<(), CoreError> {
    self.messages().insert_one(message).await.map_err(CoreError::from)?;
    Ok(())
  }

  pub async fn find_message(&self, message_id: &chatcore_core::ids::MessageId) -> Result<Option<Message>, CoreError> {
    self
      .messages()
      .find_one(doc! {"message_id": message_id.to_string()})
      .await
      .map_err(CoreError::from)
  }

  pub async fn update_message(&self, message: &Message) -> Result<(), CoreError> {
    let doc = to_document(message).map_err(|e| CoreError::Validation(e.to_string()))?;
    let result = self
      .messages()
      .update_one(doc! {"message_id": message.message_id.to_string()}, doc! {"$set": doc})
      .await
      .map_err(CoreError::from)?;
    if result.matched_count == 0 {
      return Err(CoreError::NotFound(message.message_id.to_string()));
    }
    Ok(())
  }

  /// Messages that are pending and either unscheduled or whose
  /// `scheduled_time` has passed, for the periodic scanner to promote.
  pub async fn find_due_messages(&self, now: chrono::DateTime<Utc>) -> Result<Vec<Message>, CoreError> {
    use futures::TryStreamExt;
    let now_bson = to_bson(&now).map_err(|e| CoreError::Validation(e.to_string()))?;
    let mut cursor = self
      .messages()
      .find(doc! {
        "status": "pending",
        "$or": [
          {"scheduled_time": null},
          {"scheduled_time": {"$lte": now_bson}},
        ],
      })
      .await
      .map_err(CoreError::from)?;
    let mut results = Vec::new();
    while let Some(message) = cursor.try_next().await.map_err(CoreError::from)? {
      results.push(message);
    }
    Ok(results)
  }
}
