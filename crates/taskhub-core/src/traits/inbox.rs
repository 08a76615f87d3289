use async_trait::async_trait;

use crate::error::Result;
use crate::types::InAppNotification;

/// Storage for in-app notification records.
#[async_trait]
pub trait NotificationInbox: Send + Sync {
    async fn record(&self, notification: InAppNotification) -> Result<()>;
    async fn list_for(&self, user_id: &str) -> Result<Vec<InAppNotification>>;
}
