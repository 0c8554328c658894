//! WhatsApp Business (Meta Graph API) text messages

use crate::config::WhatsAppConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Provider error code for messages outside the 24h customer-service window
const SESSION_EXPIRED_CODE: i64 = 131047;

/// How a text message send ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Delivered { message_id: Option<String> },
    /// Free-form text refused because the conversation window is closed
    SessionExpired,
}

/// Sends free-form text messages to a phone number
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    async fn send_text(&self, phone: &str, body: &str) -> Result<MessageOutcome>;
}

/// Strip everything but digits (drops the leading `+`)
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[derive(Serialize)]
struct TextPayload<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Serialize)]
struct TextBody<'a> {
    preview_url: bool,
    body: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: GraphError,
}

#[derive(Deserialize)]
struct GraphError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Meta Graph API client
pub struct WhatsAppClient {
    client: reqwest::Client,
    access_token: String,
    messages_url: String,
}

impl WhatsAppClient {
    /// Build a client; `None` when the access token or phone number id is missing
    pub fn from_config(config: &WhatsAppConfig) -> Result<Option<Self>> {
        let (Some(token), Some(phone_number_id)) = (&config.access_token, &config.phone_number_id) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Some(Self {
            client,
            access_token: token.clone(),
            messages_url: format!(
                "{}/{}/{}/messages",
                config.api_base.trim_end_matches('/'),
                config.api_version,
                phone_number_id
            ),
        }))
    }
}

#[async_trait]
impl MessagingTransport for WhatsAppClient {
    async fn send_text(&self, phone: &str, body: &str) -> Result<MessageOutcome> {
        let to = normalize_phone(phone);
        let payload = TextPayload {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: &to,
            kind: "text",
            text: TextBody {
                preview_url: true,
                body,
            },
        };

        let response = self
            .client
            .post(&self.messages_url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::external("whatsapp", format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let sent: SendResponse = response
                .json()
                .await
                .map_err(|e| AppError::external("whatsapp", format!("Failed to parse response: {}", e)))?;
            let message_id = sent.messages.into_iter().next().map(|m| m.id);
            info!(to = %to, message_id = ?message_id, "WhatsApp message sent");
            return Ok(MessageOutcome::Delivered { message_id });
        }

        let body = response.text().await.unwrap_or_default();
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
            let expired = envelope.error.code == Some(SESSION_EXPIRED_CODE)
                || envelope
                    .error
                    .message
                    .as_deref()
                    .is_some_and(|m| m.contains("24 hour"));
            if expired {
                return Ok(MessageOutcome::SessionExpired);
            }
        }

        Err(AppError::external("whatsapp", format!("API error {}: {}", status, body)))
    }
}
