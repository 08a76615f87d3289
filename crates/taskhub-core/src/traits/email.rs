use crate::types::EmailTemplate;

/// Fire-and-forget email delivery. Implementations must return without
/// waiting on the mail server and must not retry.
pub trait EmailSender: Send + Sync {
    fn send_email(&self, template: EmailTemplate, addresses: &[String], data: &serde_json::Value);
}
