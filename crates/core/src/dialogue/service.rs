use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::dialogue::engine::DialogueEngine;
use crate::dialogue::messages::ReplyCatalog;
use crate::dialogue::states::{
    DialogueAction, DialogueReply, DialogueStage, SessionChange, TransitionOutcome,
};
use crate::domain::quotation::QuotationRecord;
use crate::errors::ApplicationError;
use crate::session::{SessionStore, SessionStoreError};
use crate::sink::QuotationSink;

/// Result of handling one inbound chat message.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationTurn {
    pub from: DialogueStage,
    pub to: DialogueStage,
    pub reply: DialogueReply,
    pub reply_text: String,
    pub persisted: Option<QuotationRecord>,
}

/// Runs one message through the session store, the dialogue engine and the sink.
pub struct ConversationService {
    engine: DialogueEngine,
    replies: ReplyCatalog,
    sessions: Arc<dyn SessionStore>,
    sink: Arc<dyn QuotationSink>,
}

impl ConversationService {
    pub fn new(
        engine: DialogueEngine,
        replies: ReplyCatalog,
        sessions: Arc<dyn SessionStore>,
        sink: Arc<dyn QuotationSink>,
    ) -> Self {
        Self { engine, replies, sessions, sink }
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    /// Never fails: downstream errors are logged and turned into an apology reply.
    pub async fn handle_message(
        &self,
        sender_id: &str,
        text: &str,
        correlation_id: &str,
    ) -> ConversationTurn {
        let current = match self.sessions.get(sender_id).await {
            Ok(current) => current,
            Err(store_error) => {
                let error = ApplicationError::from(store_error);
                error!(
                    event_name = "dialogue.session_read_failed",
                    correlation_id,
                    sender_id,
                    error_class = error.class(),
                    error = %error,
                    "could not read session"
                );
                return self.turn(
                    DialogueStage::NoSession,
                    DialogueStage::NoSession,
                    DialogueReply::Unavailable,
                    None,
                );
            }
        };

        let outcome = self.engine.apply(current.as_ref(), text);
        debug!(
            event_name = "dialogue.transition",
            correlation_id,
            sender_id,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            advanced = outcome.advanced(),
            "dialogue transition computed"
        );

        let TransitionOutcome { from, to, session, reply, action } = outcome;

        let persisted = match action {
            Some(DialogueAction::PersistQuotation { estimate, contact }) => {
                let record =
                    QuotationRecord::from_estimate(sender_id, &estimate, contact, Utc::now());
                match self.sink.append(&record).await {
                    Ok(()) => {
                        info!(
                            event_name = "dialogue.quotation_persisted",
                            correlation_id,
                            sender_id,
                            quotation_id = %record.id.0,
                            sink = self.sink.name(),
                            material = %record.material,
                            quantity = record.quantity,
                            total_cost = record.total_cost,
                            "quotation persisted"
                        );
                        Ok(Some(record))
                    }
                    Err(sink_error) => {
                        let error = ApplicationError::from(sink_error);
                        error!(
                            event_name = "dialogue.quotation_persist_failed",
                            correlation_id,
                            sender_id,
                            quotation_id = %record.id.0,
                            sink = self.sink.name(),
                            error_class = error.class(),
                            error = %error,
                            "quotation could not be persisted"
                        );
                        Err(error)
                    }
                }
            }
            None => Ok(None),
        };

        // The session is dropped even when persistence failed.
        if let Err(store_error) = self.commit(sender_id, session).await {
            let error = ApplicationError::from(store_error);
            // The sink append already happened, so the record is still reported.
            let appended = persisted.ok().flatten();
            error!(
                event_name = "dialogue.session_write_failed",
                correlation_id,
                sender_id,
                quotation_id = appended.as_ref().map(|record| record.id.0.as_str()),
                error_class = error.class(),
                error = %error,
                "could not update session"
            );
            return self.turn(from, from, DialogueReply::Unavailable, appended);
        }

        match persisted {
            Ok(record) => self.turn(from, to, reply, record),
            Err(_) => self.turn(from, to, DialogueReply::PersistenceFailed, None),
        }
    }

    async fn commit(
        &self,
        sender_id: &str,
        change: SessionChange,
    ) -> Result<(), SessionStoreError> {
        match change {
            SessionChange::Unchanged => Ok(()),
            SessionChange::Store(session) => self.sessions.put(sender_id, session).await,
            SessionChange::Remove => self.sessions.delete(sender_id).await,
        }
    }

    fn turn(
        &self,
        from: DialogueStage,
        to: DialogueStage,
        reply: DialogueReply,
        persisted: Option<QuotationRecord>,
    ) -> ConversationTurn {
        let reply_text = self.replies.render(&reply);
        ConversationTurn { from, to, reply, reply_text, persisted }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::ConversationService;
    use crate::dialogue::engine::DialogueEngine;
    use crate::dialogue::messages::ReplyCatalog;
    use crate::dialogue::states::{DialogueReply, DialogueStage, Session};
    use crate::session::{InMemorySessionStore, SessionStore, SessionStoreError};
    use crate::sink::{FailingQuotationSink, InMemoryQuotationSink, QuotationSink, SinkError};

    struct Harness {
        service: ConversationService,
        sessions: Arc<InMemorySessionStore>,
        sink: InMemoryQuotationSink,
    }

    fn harness() -> Harness {
        let sessions = Arc::new(InMemorySessionStore::default());
        let sink = InMemoryQuotationSink::default();
        let service = ConversationService::new(
            DialogueEngine::default(),
            ReplyCatalog::default(),
            sessions.clone(),
            Arc::new(sink.clone()),
        );
        Harness { service, sessions, sink }
    }

    async fn send_all(service: &ConversationService, sender: &str, inputs: &[&str]) {
        for input in inputs {
            service.handle_message(sender, input, "test").await;
        }
    }

    #[tokio::test]
    async fn full_dialogue_persists_one_record_and_clears_session() {
        let h = harness();
        send_all(&h.service, "U1", &["เริ่มคำนวณ", "PP", "10x10x10", "100", "ใช่"]).await;

        let turn = h
            .service
            .handle_message("U1", "Somchai, 0812345678, somchai@example.com", "req-1")
            .await;

        assert_eq!(turn.reply, DialogueReply::Completed);
        assert_eq!(turn.to, DialogueStage::NoSession);
        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].material, "PP");
        assert_eq!(records[0].size, "10x10x10");
        assert!((records[0].total_cost - 7350.0).abs() < 1e-9);
        assert_eq!(records[0].contact.as_ref().map(|c| c.email.as_str()), Some("somchai@example.com"));
        assert_eq!(turn.persisted.as_ref(), records.first());
        assert_eq!(h.sessions.get("U1").await.expect("get"), None);
    }

    #[tokio::test]
    async fn replaying_terminal_message_does_not_duplicate_record() {
        let h = harness();
        send_all(&h.service, "U1", &["เริ่มคำนวณ", "ABS", "5x5x5", "10", "yes"]).await;
        h.service.handle_message("U1", "A, 1, a@b.c", "req-1").await;

        let replay = h.service.handle_message("U1", "A, 1, a@b.c", "req-2").await;

        assert_eq!(replay.reply, DialogueReply::NoActiveSession);
        assert!(replay.reply_text.contains("เริ่มคำนวณ"));
        assert_eq!(h.sink.records().len(), 1);
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_sender() {
        let h = harness();
        send_all(&h.service, "U1", &["เริ่มคำนวณ", "PP"]).await;
        send_all(&h.service, "U2", &["เริ่มคำนวณ"]).await;

        assert_eq!(h.sessions.get("U1").await.expect("get").map(|s| s.step()), Some(2));
        assert_eq!(h.sessions.get("U2").await.expect("get"), Some(Session::AwaitingMaterial));
    }

    #[tokio::test]
    async fn invalid_material_leaves_stored_session_untouched() {
        let h = harness();
        send_all(&h.service, "U1", &["เริ่มคำนวณ"]).await;

        let turn = h.service.handle_message("U1", "XYZ", "req").await;

        assert!(matches!(turn.reply, DialogueReply::InvalidMaterial { .. }));
        assert_eq!(h.sessions.get("U1").await.expect("get"), Some(Session::AwaitingMaterial));
    }

    #[tokio::test]
    async fn persistence_failure_apologises_and_still_drops_session() {
        let sessions = Arc::new(InMemorySessionStore::default());
        let sink: Arc<dyn QuotationSink> = Arc::new(FailingQuotationSink {
            error: SinkError::Transport("warehouse unreachable".to_owned()),
        });
        let service = ConversationService::new(
            DialogueEngine::default(),
            ReplyCatalog::default(),
            sessions.clone(),
            sink,
        );
        send_all(&service, "U1", &["เริ่มคำนวณ", "PP", "1x1x1", "1", "ใช่"]).await;

        let turn = service.handle_message("U1", "A, 1, a@b.c", "req").await;

        assert_eq!(turn.reply, DialogueReply::PersistenceFailed);
        assert!(turn.persisted.is_none());
        assert!(sessions.is_empty().await);
    }

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn get(&self, _sender_id: &str) -> Result<Option<Session>, SessionStoreError> {
            Err(SessionStoreError::Unavailable("offline".to_owned()))
        }

        async fn put(&self, _sender_id: &str, _session: Session) -> Result<(), SessionStoreError> {
            Err(SessionStoreError::Unavailable("offline".to_owned()))
        }

        async fn delete(&self, _sender_id: &str) -> Result<(), SessionStoreError> {
            Err(SessionStoreError::Unavailable("offline".to_owned()))
        }
    }

    /// Reads and writes normally but cannot remove sessions.
    #[derive(Default)]
    struct UndeletableStore {
        inner: InMemorySessionStore,
    }

    #[async_trait]
    impl SessionStore for UndeletableStore {
        async fn get(&self, sender_id: &str) -> Result<Option<Session>, SessionStoreError> {
            self.inner.get(sender_id).await
        }

        async fn put(&self, sender_id: &str, session: Session) -> Result<(), SessionStoreError> {
            self.inner.put(sender_id, session).await
        }

        async fn delete(&self, _sender_id: &str) -> Result<(), SessionStoreError> {
            Err(SessionStoreError::Unavailable("read-only".to_owned()))
        }
    }

    #[tokio::test]
    async fn appended_record_is_reported_when_session_cannot_be_cleared() {
        let sessions = Arc::new(UndeletableStore::default());
        let sink = InMemoryQuotationSink::default();
        let service = ConversationService::new(
            DialogueEngine::default(),
            ReplyCatalog::default(),
            sessions.clone(),
            Arc::new(sink.clone()),
        );
        send_all(&service, "U1", &["เริ่มคำนวณ", "PP", "10x10x10", "100", "ใช่"]).await;

        let turn = service.handle_message("U1", "A, 1, a@b.c", "req").await;

        assert_eq!(turn.reply, DialogueReply::Unavailable);
        assert_eq!(turn.to, DialogueStage::AwaitingContactInfo);
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(turn.persisted.as_ref().map(|record| &record.id), Some(&records[0].id));
        assert_eq!(sessions.inner.len().await, 1);
    }

    #[tokio::test]
    async fn session_store_failure_yields_generic_apology() {
        let service = ConversationService::new(
            DialogueEngine::default(),
            ReplyCatalog::default(),
            Arc::new(BrokenStore),
            Arc::new(InMemoryQuotationSink::default()),
        );

        let turn = service.handle_message("U1", "เริ่มคำนวณ", "req").await;

        assert_eq!(turn.reply, DialogueReply::Unavailable);
    }
}
