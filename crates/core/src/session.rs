use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::dialogue::states::Session;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Per-sender questionnaire state, keyed by platform user id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, sender_id: &str) -> Result<Option<Session>, SessionStoreError>;
    async fn put(&self, sender_id: &str, session: Session) -> Result<(), SessionStoreError>;
    async fn delete(&self, sender_id: &str) -> Result<(), SessionStoreError>;
}

/// Process-lifetime store. Entries are never evicted.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, sender_id: &str) -> Result<Option<Session>, SessionStoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(sender_id).cloned())
    }

    async fn put(&self, sender_id: &str, session: Session) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(sender_id.to_owned(), session);
        Ok(())
    }

    async fn delete(&self, sender_id: &str) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(sender_id);
        Ok(())
    }
}
