//! Notification dispatcher: fans one outbound message out to email and push.
//!
//! Partial failure is reported, never raised. The dispatch as a whole only
//! counts as failed when neither channel sent anything.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use taskhub_core::config::NotifyConfig;
use taskhub_core::traits::{EmailSender, Notifier, PushSender, UserDirectory};
use taskhub_core::types::{OutboundMessage, PushMessage, PushTicket, User, active_only};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelReport {
    pub sent: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DispatchReport {
    pub email: ChannelReport,
    pub push: ChannelReport,
    pub success: bool,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    directory: Arc<dyn UserDirectory>,
    email: Arc<dyn EmailSender>,
    push: Arc<dyn PushSender>,
    config: NotifyConfig,
}

impl NotificationDispatcher {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        email: Arc<dyn EmailSender>,
        push: Arc<dyn PushSender>,
        config: NotifyConfig,
    ) -> Self {
        Self {
            directory,
            email,
            push,
            config,
        }
    }

    /// Deliver `message` to every active recipient on its channels.
    pub async fn dispatch(&self, message: &OutboundMessage) -> DispatchReport {
        let mut report = DispatchReport::default();
        let users = self.enrich(&message.recipients, &mut report).await;

        if let Some(template) = message.template {
            let addresses = email_addresses(&users, &message.extra_addresses);
            if !addresses.is_empty() {
                self.email.send_email(template, &addresses, &message.data);
                report.email.sent = addresses.len();
            }
        }

        if let Some(content) = &message.push {
            let targets: Vec<(&User, PushMessage)> = users
                .iter()
                .filter_map(|u| {
                    let token = u.push_token.as_ref()?;
                    Some((
                        u,
                        PushMessage {
                            to: token.clone(),
                            title: content.title.clone(),
                            body: content.body.clone(),
                            data: content.data.clone(),
                        },
                    ))
                })
                .collect();
            if !targets.is_empty() {
                self.send_push(&targets, &mut report.push).await;
            }
        }

        report.success = report.email.sent > 0 || report.push.sent > 0;
        tracing::debug!(
            "📨 {} → email {}/{} push {}/{}",
            message.kind,
            report.email.sent,
            report.email.failed,
            report.push.sent,
            report.push.failed
        );
        report
    }

    /// Resolve ids and drop accounts that may not receive notifications.
    async fn enrich(&self, ids: &[String], report: &mut DispatchReport) -> Vec<User> {
        if ids.is_empty() {
            return Vec::new();
        }
        match self.directory.find_by_ids(ids).await {
            Ok(users) => active_only(users),
            Err(e) => {
                tracing::warn!("⚠️ Recipient lookup failed: {e}");
                report.email.errors.push(e.to_string());
                report.push.errors.push(e.to_string());
                Vec::new()
            }
        }
    }

    /// Send in sequential batches with a pause between them.
    async fn send_push(&self, targets: &[(&User, PushMessage)], out: &mut ChannelReport) {
        let batch_size = self.config.push_batch_size.max(1);
        let mut accepted: Vec<String> = Vec::new();

        for (i, batch) in targets.chunks(batch_size).enumerate() {
            if i > 0 && self.config.push_batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.push_batch_delay_ms)).await;
            }
            let messages: Vec<PushMessage> = batch.iter().map(|(_, m)| m.clone()).collect();
            let tickets = match self.push.send_batch(&messages).await {
                Ok(tickets) => tickets,
                Err(e) => {
                    tracing::warn!("⚠️ Push batch {} failed: {e}", i + 1);
                    out.failed += batch.len();
                    out.errors.push(e.to_string());
                    continue;
                }
            };

            for (idx, (user, _)) in batch.iter().enumerate() {
                let Some(ticket) = tickets.get(idx) else {
                    out.failed += 1;
                    out.errors.push(format!("{}: no ticket returned", user.uid));
                    continue;
                };
                match ticket {
                    PushTicket::Ok { id } => {
                        out.sent += 1;
                        accepted.push(id.clone());
                    }
                    PushTicket::Error { message, .. } => {
                        out.failed += 1;
                        out.errors.push(format!("{}: {message}", user.uid));
                        if ticket.is_token_error() {
                            self.clear_token(&user.uid).await;
                        }
                    }
                }
            }
        }

        if !accepted.is_empty() {
            self.schedule_receipt_check(accepted);
        }
    }

    async fn clear_token(&self, uid: &str) {
        tracing::info!("🔕 Clearing stale push token for {uid}");
        if let Err(e) = self.directory.clear_push_token(uid).await {
            tracing::warn!("⚠️ Failed to clear push token for {uid}: {e}");
        }
    }

    /// Look the tickets up once after the receipt delay. Log only.
    fn schedule_receipt_check(&self, ticket_ids: Vec<String>) {
        let push = self.push.clone();
        let delay = Duration::from_secs(self.config.receipt_delay_secs);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match push.check_receipts(&ticket_ids).await {
                Ok(receipts) => {
                    for (id, receipt) in receipts.iter().filter(|(_, r)| r.status != "ok") {
                        tracing::warn!(
                            "⚠️ Push {id} not delivered: {} ({})",
                            receipt.message.as_deref().unwrap_or("unknown error"),
                            receipt
                                .details
                                .as_ref()
                                .and_then(|d| d.error.as_deref())
                                .unwrap_or("no code")
                        );
                    }
                }
                Err(e) => tracing::warn!("⚠️ Push receipt check failed: {e}"),
            }
        });
    }
}

impl Notifier for NotificationDispatcher {
    fn publish(&self, message: OutboundMessage) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("⚠️ No runtime available, dropping {} notification", message.kind);
            return;
        };
        let dispatcher = self.clone();
        handle.spawn(async move {
            let report = dispatcher.dispatch(&message).await;
            if !report.success {
                tracing::warn!("⚠️ {} notification reached nobody", message.kind);
            }
        });
    }
}

/// Active users' addresses followed by extra addresses, deduplicated.
fn email_addresses(users: &[User], extra: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for addr in users.iter().filter_map(|u| u.email.as_ref()).chain(extra) {
        let addr = addr.trim();
        if !addr.is_empty() && !out.iter().any(|a| a.eq_ignore_ascii_case(addr)) {
            out.push(addr.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use taskhub_core::TaskHubError;
    use taskhub_core::error::Result;
    use taskhub_core::memory::{InMemoryUserDirectory, RecordingEmailSender};
    use taskhub_core::types::{AccountStatus, EmailTemplate, NotificationKind, PushReceipt};

    /// Accepts every token except the ones listed as unregistered.
    #[derive(Default)]
    struct FakePush {
        batches: Mutex<Vec<Vec<PushMessage>>>,
        unregistered: Vec<String>,
        down: bool,
    }

    #[async_trait]
    impl PushSender for FakePush {
        async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>> {
            if self.down {
                return Err(TaskHubError::Notification("push provider unavailable".into()));
            }
            self.batches.lock().unwrap().push(messages.to_vec());
            Ok(messages
                .iter()
                .map(|m| {
                    if self.unregistered.contains(&m.to) {
                        serde_json::from_value(serde_json::json!({
                            "status": "error",
                            "message": format!("\"{}\" is not a registered push notification recipient", m.to),
                            "details": {"error": "DeviceNotRegistered"}
                        }))
                        .unwrap()
                    } else {
                        PushTicket::Ok { id: format!("ticket-{}", m.to) }
                    }
                })
                .collect())
        }

        async fn check_receipts(&self, _ids: &[String]) -> Result<HashMap<String, PushReceipt>> {
            Ok(HashMap::new())
        }
    }

    fn user(uid: &str, status: AccountStatus, token: bool) -> User {
        let mut u = User::new(uid, uid, Some(&format!("{uid}@example.com")));
        u.account_status = status;
        if token {
            u.push_token = Some(format!("tok-{uid}"));
        }
        u
    }

    fn config() -> NotifyConfig {
        NotifyConfig {
            push_batch_size: 2,
            push_batch_delay_ms: 0,
            receipt_delay_secs: 0,
            ..NotifyConfig::default()
        }
    }

    fn setup(push: FakePush, users: Vec<User>) -> (NotificationDispatcher, Arc<InMemoryUserDirectory>, Arc<RecordingEmailSender>, Arc<FakePush>) {
        let directory = Arc::new(InMemoryUserDirectory::with_users(users));
        let email = Arc::new(RecordingEmailSender::new());
        let push = Arc::new(push);
        let dispatcher =
            NotificationDispatcher::new(directory.clone(), email.clone(), push.clone(), config());
        (dispatcher, directory, email, push)
    }

    fn message(ids: &[&str]) -> OutboundMessage {
        OutboundMessage::new(
            NotificationKind::TaskCompleted,
            ids.iter().map(|s| s.to_string()).collect(),
        )
        .with_email(serde_json::json!({"title": "Fix pump"}))
        .with_push("Task completed", "Fix pump")
    }

    #[tokio::test]
    async fn test_filters_inactive_and_batches_push() {
        let users = vec![
            user("u1", AccountStatus::Active, true),
            user("u2", AccountStatus::Pending, true),
            user("u3", AccountStatus::Active, true),
            user("u4", AccountStatus::Banned, true),
            user("u5", AccountStatus::Declined, true),
            user("u6", AccountStatus::Active, false),
            user("u7", AccountStatus::Active, true),
        ];
        let (dispatcher, _, email, push) = setup(FakePush::default(), users);
        let msg = message(&["u1", "u2", "u3", "u4", "u5", "u6", "u7"])
            .with_addresses(vec!["client@acme.test".into(), "U1@example.com".into()]);

        let report = dispatcher.dispatch(&msg).await;

        let sent = email.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, EmailTemplate::TaskCompleted);
        assert_eq!(
            sent[0].addresses,
            vec![
                "u1@example.com",
                "u2@example.com",
                "u3@example.com",
                "u6@example.com",
                "u7@example.com",
                "client@acme.test",
            ]
        );
        assert_eq!(report.email.sent, 6);

        let batches = push.batches.lock().unwrap().clone();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2]);
        assert_eq!(report.push.sent, 4);
        assert!(report.success);
    }

    #[tokio::test]
    async fn test_token_errors_clear_token() {
        let users = vec![user("u1", AccountStatus::Active, true), user("u2", AccountStatus::Active, true)];
        let push = FakePush {
            unregistered: vec!["tok-u2".into()],
            ..FakePush::default()
        };
        let (dispatcher, directory, _, _) = setup(push, users);

        let report = dispatcher.dispatch(&message(&["u1", "u2"])).await;
        assert_eq!((report.push.sent, report.push.failed), (1, 1));
        assert_eq!(report.push.errors.len(), 1);
        assert!(directory.get("u2").await.unwrap().push_token.is_none());
        assert!(directory.get("u1").await.unwrap().push_token.is_some());
    }

    #[tokio::test]
    async fn test_push_outage_is_partial_failure() {
        let users = vec![user("u1", AccountStatus::Active, true)];
        let push = FakePush {
            down: true,
            ..FakePush::default()
        };
        let (dispatcher, _, email, _) = setup(push, users);

        let report = dispatcher.dispatch(&message(&["u1"])).await;
        assert_eq!(report.push.failed, 1);
        assert_eq!(report.email.sent, 1);
        assert_eq!(email.sent().len(), 1);
        assert!(report.success);
    }

    #[tokio::test]
    async fn test_nothing_sent_is_failure() {
        let users = vec![user("u1", AccountStatus::Deleted, true)];
        let (dispatcher, _, email, push) = setup(FakePush::default(), users);

        let report = dispatcher.dispatch(&message(&["u1", "ghost"])).await;
        assert!(!report.success);
        assert!(email.sent().is_empty());
        assert!(push.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_runs_in_background() {
        let users = vec![user("u1", AccountStatus::Active, false)];
        let (dispatcher, _, email, _) = setup(FakePush::default(), users);

        dispatcher.publish(message(&["u1"]));
        for _ in 0..50 {
            if !email.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(email.sent().len(), 1);
    }
}
