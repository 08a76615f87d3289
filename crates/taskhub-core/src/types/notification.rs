//! Notification data model: outbound messages, push tickets, in-app records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::task::new_id;

/// What happened, from the recipient's point of view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskCreated,
    TaskCompleted,
    FlagCreated,
    FlagResolved,
    DeadlineReminder,
    OverdueDigest,
    OvertimeReminder,
}

impl NotificationKind {
    /// Email template that goes with this kind by default.
    pub fn template(&self) -> EmailTemplate {
        match self {
            NotificationKind::TaskCreated => EmailTemplate::TaskCreated,
            NotificationKind::TaskCompleted => EmailTemplate::TaskCompleted,
            NotificationKind::FlagCreated => EmailTemplate::FlagCreated,
            NotificationKind::FlagResolved => EmailTemplate::FlagResolved,
            NotificationKind::DeadlineReminder => EmailTemplate::DeadlineReminder,
            NotificationKind::OverdueDigest => EmailTemplate::OverdueDigest,
            NotificationKind::OvertimeReminder => EmailTemplate::OvertimeReminder,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationKind::TaskCreated => "task_created",
            NotificationKind::TaskCompleted => "task_completed",
            NotificationKind::FlagCreated => "flag_created",
            NotificationKind::FlagResolved => "flag_resolved",
            NotificationKind::DeadlineReminder => "deadline_reminder",
            NotificationKind::OverdueDigest => "overdue_digest",
            NotificationKind::OvertimeReminder => "overtime_reminder",
        };
        f.write_str(s)
    }
}

/// Email template handed to the email sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    TaskCreated,
    TaskCompleted,
    FlagCreated,
    FlagResolved,
    DeadlineReminder,
    OverdueDigest,
    OvertimeReminder,
}

impl EmailTemplate {
    pub fn subject(&self) -> &'static str {
        match self {
            EmailTemplate::TaskCreated => "New task assigned",
            EmailTemplate::TaskCompleted => "Task completed",
            EmailTemplate::FlagCreated => "Task flagged",
            EmailTemplate::FlagResolved => "Flag resolved",
            EmailTemplate::DeadlineReminder => "Task deadline approaching",
            EmailTemplate::OverdueDigest => "Overdue and missed tasks",
            EmailTemplate::OvertimeReminder => "You are still checked in",
        }
    }
}

/// Push payload shared by every recipient of one message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushContent {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// One logical notification event, fanned out by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundMessage {
    pub kind: NotificationKind,
    /// User ids; resolved and filtered to active accounts before sending.
    pub recipients: Vec<String>,
    /// Raw email addresses outside the user directory (client collaborators).
    #[serde(default)]
    pub extra_addresses: Vec<String>,
    /// None when the message has no email leg.
    #[serde(default)]
    pub template: Option<EmailTemplate>,
    #[serde(default)]
    pub data: serde_json::Value,
    /// None when the message has no push leg.
    #[serde(default)]
    pub push: Option<PushContent>,
}

impl OutboundMessage {
    pub fn new(kind: NotificationKind, recipients: Vec<String>) -> Self {
        Self {
            kind,
            recipients,
            extra_addresses: Vec::new(),
            template: None,
            data: serde_json::Value::Null,
            push: None,
        }
    }

    pub fn with_email(mut self, data: serde_json::Value) -> Self {
        self.template = Some(self.kind.template());
        self.data = data;
        self
    }

    pub fn with_push(mut self, title: &str, body: &str) -> Self {
        self.push = Some(PushContent {
            title: title.to_string(),
            body: body.to_string(),
            data: serde_json::json!({ "kind": self.kind.to_string() }),
        });
        self
    }

    pub fn with_addresses(mut self, addresses: Vec<String>) -> Self {
        self.extra_addresses = addresses;
        self
    }
}

/// One message inside a push batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Per-message result of a push batch call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PushTicket {
    Ok {
        id: String,
    },
    Error {
        message: String,
        #[serde(default)]
        details: Option<PushErrorDetails>,
    },
}

/// Provider error code attached to a failed ticket or receipt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PushErrorDetails {
    #[serde(default)]
    pub error: Option<String>,
}

impl PushTicket {
    pub fn error_code(&self) -> Option<&str> {
        match self {
            PushTicket::Error { details: Some(details), .. } => details.error.as_deref(),
            _ => None,
        }
    }

    /// Ticket errors that mean the stored token is no longer usable.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self.error_code(),
            Some("DeviceNotRegistered" | "InvalidCredentials")
        )
    }
}

/// Delivery receipt for a previously accepted ticket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushReceipt {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<PushErrorDetails>,
}

/// Record shown in a user's in-app notification list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InAppNotification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl InAppNotification {
    pub fn new(
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
        task_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            kind,
            title: title.to_string(),
            message: message.to_string(),
            task_id: task_id.map(String::from),
            read: false,
            created_at: now,
        }
    }
}
