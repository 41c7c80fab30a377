use chatcore_core::error::CoreError;
use chatcore_core::ids::UserId;
use chatcore_core::models::{UserContext, UserDocument, UserProfile};
use chrono::Utc;
use tracing::{error, warn};

use crate::config::{DocumentStoreConfig, RelationalStoreConfig};
use crate::document_store::DocumentStore;
use crate::relational_store::RelationalStore;

/// Health snapshot used by a readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHealth {
  pub document_ok: bool,
  pub relational_ok: bool,
}

/// The two independently-connected stores this core coordinates: a
/// document store for dynamic per-user state and a relational store
/// for profiles and subscriptions. There is no distributed
/// transaction between them — `create_user_atomic` gives
/// at-most-one-orphan semantics via compensation plus read-time
/// repair in the user service.
pub struct StorePair {
  pub document: DocumentStore,
  pub relational: RelationalStore,
}

impl StorePair {
  pub async fn connect_all(
    document_config: &DocumentStoreConfig,
    relational_config: &RelationalStoreConfig,
  ) -> Result<Self, CoreError> {
    let document = DocumentStore::connect_with_retry(document_config).await?;
    document.initialize_collections().await?;
    let relational = RelationalStore::connect_with_retry(relational_config).await?;
    Ok(Self { document, relational })
  }

  pub async fn health(&self) -> StoreHealth {
    StoreHealth {
      document_ok: self.document.ping().await.is_ok(),
      relational_ok: self.relational.ping().await.is_ok(),
    }
  }

  /// Writes to the document store first, then the relational store.
  /// On relational failure, compensates by deleting the document
  /// record so the pair never observes a permanent DS-only orphan
  /// from this call alone. On document failure, aborts before
  /// touching the relational store.
  pub async fn create_user_atomic(
    &self,
    document: UserDocument,
    profile: UserProfile,
  ) -> Result<(), CoreError> {
    let user_id = document.user_id.clone();

    self.document.insert_user(&document).await?;

    if let Err(relational_err) = self.relational.insert_profile(&profile).await {
      match self.document.delete_user(&user_id).await {
        Ok(()) => {
          warn!(%user_id, error = %relational_err, "relational insert failed, compensated by removing document record");
        }
        Err(compensation_err) => {
          error!(
            %user_id,
            relational_error = %relational_err,
            compensation_error = %compensation_err,
            "data_inconsistency: relational insert and document compensation both failed"
          );
        }
      }
      return Err(relational_err);
    }

    Ok(())
  }

  /// Merged view of a user, repairing Invariant U1 lazily per §4.D:
  /// a relational profile with no document is reconstructed from
  /// defaults (the orphan didn't ask to be deleted, it's just missing
  /// its dynamic-state half); a document with no relational profile
  /// has no profile data to reconstruct from, so it is deleted as an
  /// orphan instead. Both paths are logged as `data_inconsistency`.
  pub async fn get_user_context(&self, user_id: &UserId) -> Result<Option<UserContext>, CoreError> {
    let document = self.document.find_user(user_id).await?;
    let profile = self.relational.get_profile(user_id).await?;

    match (document, profile) {
      (Some(document), Some(profile)) => Ok(Some(UserContext { document, profile })),
      (None, None) => Ok(None),
      (Some(_), None) => {
        warn!(%user_id, "data_inconsistency: document record without relational profile, repairing by removing document record");
        self.document.delete_user(user_id).await?;
        Ok(None)
      }
      (None, Some(profile)) => {
        warn!(%user_id, "data_inconsistency: relational profile without document record, repairing by reconstructing document defaults");
        let document = UserDocument::new_default(user_id.clone(), profile.language_code.clone(), Utc::now());
        self.document.insert_user(&document).await?;
        Ok(Some(UserContext { document, profile }))
      }
    }
  }

  /// Removes a user from both stores. Best-effort: a failure on one
  /// side after the other succeeded is reported but not rolled back,
  /// since deletion has no compensating action other than re-repair
  /// on next `get_user_context`.
  pub async fn delete_user(&self, user_id: &UserId) -> Result<(), CoreError> {
    let document_result = self.document.delete_user(user_id).await;
    let relational_result = self.relational.delete_profile(user_id).await;
    self.relational.delete_subscriptions(user_id).await.ok();

    document_result?;
    relational_result?;
    Ok(())
  }

  pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn store_health_reports_both_flags() {
    let health = StoreHealth {
      document_ok: true,
      relational_ok: false,
    };
    assert!(health.document_ok);
    assert!(!health.relational_ok);
  }
}
