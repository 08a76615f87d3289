use async_trait::async_trait;

use crate::error::Result;
use crate::types::User;

/// Resolves user ids to contact details.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Users for the given ids; unknown ids are skipped.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn clear_push_token(&self, uid: &str) -> Result<()>;
}
