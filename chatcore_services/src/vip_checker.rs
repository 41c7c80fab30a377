use async_trait::async_trait;
use chatcore_core::error::CoreError;
use chatcore_core::ids::UserId;

/// Narrow capability the Narrative Service needs to gate VIP content,
/// implemented by the Coordinator (`validate_vip_access`) without the
/// Narrative Service depending on the coordinator crate directly.
#[async_trait]
pub trait VIPChecker: Send + Sync {
  async fn is_vip(&self, user_id: &UserId) -> Result<bool, CoreError>;
}
