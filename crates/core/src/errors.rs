use thiserror::Error;

use crate::session::SessionStoreError;
use crate::sink::SinkError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid material catalog: {0}")]
    InvalidCatalog(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("session store failure: {0}")]
    Session(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
}

impl ApplicationError {
    /// Short class name used in structured logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain",
            Self::Session(_) => "session",
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
        }
    }
}

impl From<SessionStoreError> for ApplicationError {
    fn from(value: SessionStoreError) -> Self {
        Self::Session(value.to_string())
    }
}

impl From<SinkError> for ApplicationError {
    fn from(value: SinkError) -> Self {
        match value {
            SinkError::Transport(message) => Self::Integration(message),
            other => Self::Persistence(other.to_string()),
        }
    }
}
