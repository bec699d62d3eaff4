use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use moldquote_line::events::{parse_webhook, EventContext, EventDispatcher, HandlerResult};
use moldquote_line::signature::{SignatureVerifier, SIGNATURE_HEADER};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct WebhookState {
    dispatcher: Arc<EventDispatcher>,
    verifier: Option<SignatureVerifier>,
}

impl WebhookState {
    pub fn new(dispatcher: Arc<EventDispatcher>, verifier: Option<SignatureVerifier>) -> Self {
        Self { dispatcher, verifier }
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/", get(root)).route("/callback", post(callback)).with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "moldquote webhook is running" }))
}

/// Answers 200 for every accepted body so the platform does not redeliver;
/// failures are only visible in logs.
async fn callback(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    if let Some(verifier) = &state.verifier {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
        if let Err(rejection) = verifier.verify(&body, signature) {
            warn!(
                event_name = "line.webhook.signature_rejected",
                correlation_id = "webhook",
                reason = %rejection,
                "webhook signature rejected"
            );
            return (StatusCode::UNAUTHORIZED, Json(json!({ "status": "unauthorized" })));
        }
    }

    let envelopes = match parse_webhook(&body) {
        Ok(envelopes) => envelopes,
        Err(parse_error) => {
            error!(
                event_name = "line.webhook.parse_failed",
                correlation_id = "webhook",
                error = %parse_error,
                "could not decode webhook body"
            );
            return (
                StatusCode::OK,
                Json(json!({ "status": "error", "message": "unparsable webhook body" })),
            );
        }
    };

    let mut replied = 0usize;
    for envelope in &envelopes {
        let ctx = EventContext {
            correlation_id: envelope
                .webhook_event_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        };

        match state.dispatcher.dispatch(envelope, &ctx).await {
            Ok(HandlerResult::Replied { .. }) => replied += 1,
            Ok(HandlerResult::Ignored) => {}
            Err(dispatch_error) => {
                error!(
                    event_name = "line.reply.failed",
                    correlation_id = %ctx.correlation_id,
                    error = %dispatch_error,
                    "reply delivery failed"
                );
            }
        }
    }

    info!(
        event_name = "line.webhook.processed",
        correlation_id = "webhook",
        events = envelopes.len(),
        replied,
        "webhook processed"
    );

    (StatusCode::OK, Json(json!({ "status": "ok", "events": envelopes.len(), "replied": replied })))
}
