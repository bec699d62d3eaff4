use async_trait::async_trait;
use thiserror::Error;

use moldquote_core::domain::quotation::{QuotationId, QuotationRecord};

pub mod quotation;

pub use quotation::SqlQuotationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait QuotationRepository: Send + Sync {
    async fn find_by_id(&self, id: &QuotationId)
        -> Result<Option<QuotationRecord>, RepositoryError>;
    async fn save(&self, record: &QuotationRecord) -> Result<(), RepositoryError>;
    /// Newest first.
    async fn list_recent(&self, limit: u32) -> Result<Vec<QuotationRecord>, RepositoryError>;
}
