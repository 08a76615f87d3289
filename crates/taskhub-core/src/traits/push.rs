use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::types::{PushMessage, PushReceipt, PushTicket};

/// Push provider. One ticket is returned per message, in order.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>>;
    async fn check_receipts(&self, ticket_ids: &[String]) -> Result<HashMap<String, PushReceipt>>;
}
