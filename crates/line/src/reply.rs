use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use moldquote_core::config::{DeliveryMode, LineConfig};

/// Upper bound the messaging API accepts for one text message.
pub const MAX_TEXT_CHARS: usize = 5000;

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("reply transport failed: {0}")]
    Transport(String),
    #[error("messaging api returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("could not build http client: {0}")]
    Client(String),
}

/// Who a reply goes to. The reply token is single-use and short-lived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyTarget {
    pub reply_token: Option<String>,
    pub user_id: String,
}

#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, target: &ReplyTarget, text: &str) -> Result<(), ReplyError>;
}

pub struct LineMessagingClient {
    client: Client,
    api_base_url: String,
    channel_access_token: SecretString,
    delivery: DeliveryMode,
}

impl LineMessagingClient {
    pub fn new(
        client: Client,
        api_base_url: impl Into<String>,
        channel_access_token: SecretString,
        delivery: DeliveryMode,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            channel_access_token,
            delivery,
        }
    }

    pub fn from_config(config: &LineConfig) -> Result<Self, ReplyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| ReplyError::Client(error.to_string()))?;

        Ok(Self::new(
            client,
            config.api_base_url.clone(),
            config.channel_access_token.clone(),
            config.delivery,
        ))
    }

    async fn post(&self, path: &str, body: Value) -> Result<(), ReplyError> {
        let response = self
            .client
            .post(format!("{}{}", self.api_base_url, path))
            .bearer_auth(self.channel_access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| ReplyError::Transport(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ReplyError::Api { status: status.as_u16(), body })
    }
}

#[async_trait]
impl ReplySender for LineMessagingClient {
    async fn send(&self, target: &ReplyTarget, text: &str) -> Result<(), ReplyError> {
        let messages = json!([{ "type": "text", "text": truncate_text(text) }]);

        match (self.delivery, target.reply_token.as_deref()) {
            (DeliveryMode::Reply, Some(reply_token)) => {
                debug!(event_name = "line.reply.sending", sender_id = %target.user_id, "reply");
                self.post(
                    "/v2/bot/message/reply",
                    json!({ "replyToken": reply_token, "messages": messages }),
                )
                .await
            }
            (mode, _) => {
                if mode == DeliveryMode::Reply {
                    warn!(
                        event_name = "line.reply.no_token",
                        sender_id = %target.user_id,
                        "event carried no reply token, falling back to push"
                    );
                }
                self.post("/v2/bot/message/push", json!({ "to": target.user_id, "messages": messages }))
                    .await
            }
        }
    }
}

/// Cuts `text` to the platform limit on a character boundary.
pub fn truncate_text(text: &str) -> &str {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Captures replies instead of sending them.
#[derive(Clone, Default)]
pub struct RecordingReplySender {
    sent: Arc<Mutex<Vec<(ReplyTarget, String)>>>,
}

impl RecordingReplySender {
    pub fn sent(&self) -> Vec<(ReplyTarget, String)> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ReplySender for RecordingReplySender {
    async fn send(&self, target: &ReplyTarget, text: &str) -> Result<(), ReplyError> {
        let entry = (target.clone(), text.to_owned());
        match self.sent.lock() {
            Ok(mut sent) => sent.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
        Ok(())
    }
}
