use crate::types::OutboundMessage;

/// Hands an outbound message to the notification layer.
///
/// `publish` never blocks on delivery; mutation paths call it and move on.
pub trait Notifier: Send + Sync {
    fn publish(&self, message: OutboundMessage);
}
