use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use moldquote_core::dialogue::ConversationService;

use crate::reply::{ReplyError, ReplySender, ReplyTarget};

/// Raw webhook body as posted by the platform.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub webhook_event_id: Option<String>,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<RawSource>,
    #[serde(default)]
    pub message: Option<RawMessage>,
    #[serde(default)]
    pub delivery_context: Option<RawDeliveryContext>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSource {
    #[serde(rename = "type", default)]
    pub source_type: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawMessage {
    #[serde(rename = "type", default)]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeliveryContext {
    #[serde(default)]
    pub is_redelivery: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineEnvelope {
    pub webhook_event_id: Option<String>,
    pub is_redelivery: bool,
    pub event: LineEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineEvent {
    TextMessage(TextMessageEvent),
    Unsupported { event_type: String },
}

impl LineEvent {
    pub fn event_type(&self) -> LineEventType {
        match self {
            Self::TextMessage(_) => LineEventType::TextMessage,
            Self::Unsupported { .. } => LineEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineEventType {
    TextMessage,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessageEvent {
    pub user_id: String,
    pub reply_token: Option<String>,
    pub text: String,
}

impl From<RawEvent> for LineEnvelope {
    fn from(raw: RawEvent) -> Self {
        let is_redelivery = raw.delivery_context.as_ref().is_some_and(|ctx| ctx.is_redelivery);
        let webhook_event_id = raw.webhook_event_id.clone();
        Self { webhook_event_id, is_redelivery, event: classify(raw) }
    }
}

/// Only `message` events with `text` content and a user id are actionable.
fn classify(raw: RawEvent) -> LineEvent {
    let unsupported = |event_type: String| LineEvent::Unsupported { event_type };

    if raw.event_type != "message" {
        return unsupported(raw.event_type);
    }
    let Some(message) = raw.message else {
        return unsupported("message/empty".to_owned());
    };
    if message.message_type != "text" {
        return unsupported(format!("message/{}", message.message_type));
    }
    let user_id = raw.source.and_then(|source| source.user_id).filter(|id| !id.is_empty());
    match (user_id, message.text) {
        (Some(user_id), Some(text)) => LineEvent::TextMessage(TextMessageEvent {
            user_id,
            reply_token: raw.reply_token.filter(|token| !token.is_empty()),
            text,
        }),
        _ => unsupported("message/text-incomplete".to_owned()),
    }
}

#[derive(Debug, Error)]
#[error("webhook body is not a valid event payload: {0}")]
pub struct WebhookParseError(#[from] serde_json::Error);

pub fn parse_webhook(body: &[u8]) -> Result<Vec<LineEnvelope>, WebhookParseError> {
    let payload: WebhookPayload = serde_json::from_slice(body)?;
    Ok(payload.events.into_iter().map(LineEnvelope::from).collect())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Replied { text: String },
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Reply(#[from] ReplyError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> LineEventType;
    async fn handle(
        &self,
        envelope: &LineEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<LineEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &LineEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            debug!(
                event_name = "line.event.ignored",
                correlation_id = %ctx.correlation_id,
                event = ?envelope.event,
                "no handler for event"
            );
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await
    }
}

/// Feeds text messages into the questionnaire and delivers the reply.
pub struct TextMessageHandler {
    service: Arc<ConversationService>,
    replies: Arc<dyn ReplySender>,
}

impl TextMessageHandler {
    pub fn new(service: Arc<ConversationService>, replies: Arc<dyn ReplySender>) -> Self {
        Self { service, replies }
    }
}

#[async_trait]
impl EventHandler for TextMessageHandler {
    fn event_type(&self) -> LineEventType {
        LineEventType::TextMessage
    }

    async fn handle(
        &self,
        envelope: &LineEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let LineEvent::TextMessage(message) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if envelope.is_redelivery {
            warn!(
                event_name = "line.event.redelivered",
                correlation_id = %ctx.correlation_id,
                sender_id = %message.user_id,
                "processing redelivered event"
            );
        }

        let turn =
            self.service.handle_message(&message.user_id, &message.text, &ctx.correlation_id).await;

        let target = ReplyTarget {
            reply_token: message.reply_token.clone(),
            user_id: message.user_id.clone(),
        };
        self.replies.send(&target, &turn.reply_text).await?;

        Ok(HandlerResult::Replied { text: turn.reply_text })
    }
}

pub fn conversation_dispatcher(
    service: Arc<ConversationService>,
    replies: Arc<dyn ReplySender>,
) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(TextMessageHandler::new(service, replies));
    dispatcher
}
