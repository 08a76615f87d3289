//! Expo-style push sender over HTTP.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use taskhub_core::config::NotifyConfig;
use taskhub_core::error::{Result, TaskHubError};
use taskhub_core::traits::PushSender;
use taskhub_core::types::{PushMessage, PushReceipt, PushTicket};

#[derive(Deserialize)]
struct TicketResponse {
    #[serde(default)]
    data: Vec<PushTicket>,
}

#[derive(Deserialize)]
struct ReceiptResponse {
    #[serde(default)]
    data: HashMap<String, PushReceipt>,
}

pub struct ExpoPushSender {
    client: reqwest::Client,
    push_url: String,
    receipts_url: String,
    access_token: Option<String>,
}

impl ExpoPushSender {
    pub fn new(config: &NotifyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            push_url: config.push_url.clone(),
            receipts_url: config.receipts_url.clone(),
            access_token: config.push_access_token.clone(),
        }
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) if !token.is_empty() => {
                req.header("Authorization", format!("Bearer {token}"))
            }
            _ => req,
        }
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let req = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(body);
        let resp = self
            .apply_auth(req)
            .send()
            .await
            .map_err(|e| TaskHubError::Notification(format!("push connection failed ({url}): {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(TaskHubError::Notification(format!("push API error {status}: {text}")));
        }
        Ok(resp)
    }
}

/// Request body for one batch.
pub(crate) fn batch_payload(messages: &[PushMessage]) -> serde_json::Value {
    serde_json::Value::Array(
        messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "to": m.to,
                    "title": m.title,
                    "body": m.body,
                    "data": m.data,
                    "sound": "default",
                })
            })
            .collect(),
    )
}

#[async_trait]
impl PushSender for ExpoPushSender {
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>> {
        let resp = self.post(&self.push_url, &batch_payload(messages)).await?;
        let parsed: TicketResponse = resp
            .json()
            .await
            .map_err(|e| TaskHubError::Notification(format!("push response: {e}")))?;
        tracing::debug!("📲 Push batch of {} → {} ticket(s)", messages.len(), parsed.data.len());
        Ok(parsed.data)
    }

    async fn check_receipts(&self, ticket_ids: &[String]) -> Result<HashMap<String, PushReceipt>> {
        let body = serde_json::json!({ "ids": ticket_ids });
        let resp = self.post(&self.receipts_url, &body).await?;
        let parsed: ReceiptResponse = resp
            .json()
            .await
            .map_err(|e| TaskHubError::Notification(format!("receipt response: {e}")))?;
        Ok(parsed.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_payload_shape() {
        let payload = batch_payload(&[PushMessage {
            to: "ExponentPushToken[abc]".into(),
            title: "Task completed".into(),
            body: "Fix pump".into(),
            data: serde_json::json!({"kind": "task_completed"}),
        }]);
        assert_eq!(payload[0]["to"], "ExponentPushToken[abc]");
        assert_eq!(payload[0]["sound"], "default");
        assert_eq!(payload[0]["data"]["kind"], "task_completed");
    }

    #[test]
    fn test_parse_responses() {
        let tickets: TicketResponse = serde_json::from_str(
            r#"{"data":[
                {"status":"ok","id":"t1"},
                {"status":"error","message":"Invalid credentials","details":{"error":"InvalidCredentials"}},
                {"status":"error","message":"Too many requests","details":{"error":"MessageRateExceeded"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(tickets.data.len(), 3);
        assert!(!tickets.data[0].is_token_error());
        assert!(tickets.data[1].is_token_error());
        assert!(!tickets.data[2].is_token_error());

        let receipts: ReceiptResponse = serde_json::from_str(
            r#"{"data":{
                "t1":{"status":"ok"},
                "t2":{"status":"error","message":"device gone","details":{"error":"DeviceNotRegistered"}}
            }}"#,
        )
        .unwrap();
        assert_eq!(receipts.data["t1"].status, "ok");
        let failed = &receipts.data["t2"];
        assert_eq!(failed.message.as_deref(), Some("device gone"));
        assert_eq!(
            failed.details.as_ref().and_then(|d| d.error.as_deref()),
            Some("DeviceNotRegistered")
        );
    }
}
