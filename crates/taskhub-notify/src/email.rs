//! SMTP email sender (async lettre).
//!
//! `send_email` hands the delivery to a spawned task and returns at once.
//! Bodies are plain text rendered from the template subject and JSON data.

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use taskhub_core::config::EmailConfig;
use taskhub_core::error::{Result, TaskHubError};
use taskhub_core::traits::EmailSender;
use taskhub_core::types::EmailTemplate;

pub struct SmtpEmailSender {
    config: EmailConfig,
}

impl SmtpEmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn from_mailbox(&self) -> Result<Mailbox> {
        format!("{} <{}>", self.config.display_name, self.config.from_address)
            .parse()
            .map_err(|e| TaskHubError::Notification(format!("Invalid from: {e}")))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        Ok(AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| TaskHubError::Notification(format!("SMTP relay: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build())
    }

    /// One message per address so recipients never see each other.
    fn build_messages(
        &self,
        template: EmailTemplate,
        addresses: &[String],
        data: &serde_json::Value,
    ) -> Result<Vec<Message>> {
        let from = self.from_mailbox()?;
        let body = render_body(template, data);
        let mut messages = Vec::with_capacity(addresses.len());
        for addr in addresses {
            let to: Mailbox = match addr.parse() {
                Ok(to) => to,
                Err(e) => {
                    tracing::warn!("⚠️ Skipping invalid address {addr}: {e}");
                    continue;
                }
            };
            let message = Message::builder()
                .from(from.clone())
                .to(to)
                .subject(template.subject())
                .header(ContentType::TEXT_PLAIN)
                .body(body.clone())
                .map_err(|e| TaskHubError::Notification(format!("Build email: {e}")))?;
            messages.push(message);
        }
        Ok(messages)
    }
}

impl EmailSender for SmtpEmailSender {
    fn send_email(&self, template: EmailTemplate, addresses: &[String], data: &serde_json::Value) {
        if !self.config.enabled {
            tracing::debug!("📭 Email disabled, skipping {template:?} to {} address(es)", addresses.len());
            return;
        }
        let prepared = self
            .build_messages(template, addresses, data)
            .and_then(|messages| Ok((self.transport()?, messages)));
        let (mailer, messages) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!("⚠️ Email {template:?} not sent: {e}");
                return;
            }
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("⚠️ No runtime available, dropping {template:?} email");
            return;
        };
        handle.spawn(async move {
            for message in messages {
                let to = message.envelope().to().first().map(ToString::to_string);
                match mailer.send(message).await {
                    Ok(_) => tracing::info!("📤 Email sent to: {}", to.unwrap_or_default()),
                    Err(e) => tracing::warn!("⚠️ SMTP send failed: {e}"),
                }
            }
        });
    }
}

/// Plain-text body: subject line, then one `key: value` line per data field.
pub fn render_body(template: EmailTemplate, data: &serde_json::Value) -> String {
    let mut body = format!("{}\n\n", template.subject());
    if let Some(fields) = data.as_object() {
        for (key, value) in fields {
            let text = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            body.push_str(&format!("{}: {text}\n", humanize(key)));
        }
    }
    body.push_str("\nSent by TaskHub\n");
    body
}

/// `completedAt` → `Completed at`
fn humanize(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if i == 0 {
            out.extend(c.to_uppercase());
        } else if c.is_uppercase() {
            out.push(' ');
            out.extend(c.to_lowercase());
        } else if c == '_' {
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}
