//! LINE Messaging API integration
//!
//! - **Events** (`events`) - webhook payload decoding and dispatch to handlers
//! - **Signature** (`signature`) - `x-line-signature` verification
//! - **Reply** (`reply`) - outbound reply/push messages
//!
//! # Architecture
//!
//! ```text
//! POST /callback → SignatureVerifier → parse_webhook → EventDispatcher
//!                                                        ↓
//!                       ReplySender ← ConversationService (core)
//! ```

pub mod events;
pub mod reply;
pub mod signature;

pub use events::{
    conversation_dispatcher, parse_webhook, EventContext, EventDispatcher, HandlerResult,
    LineEnvelope, LineEvent, WebhookParseError,
};
pub use reply::{LineMessagingClient, RecordingReplySender, ReplyError, ReplySender, ReplyTarget};
pub use signature::{SignatureError, SignatureVerifier, SIGNATURE_HEADER};
