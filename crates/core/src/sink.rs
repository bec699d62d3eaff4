use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::domain::quotation::QuotationRecord;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink transport failed: {0}")]
    Transport(String),
    #[error("sink rejected rows: {0}")]
    Rejected(String),
    #[error("sink storage failed: {0}")]
    Storage(String),
}

/// Append-only destination for finished quotations.
#[async_trait]
pub trait QuotationSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn append(&self, record: &QuotationRecord) -> Result<(), SinkError>;
}

#[derive(Clone, Default)]
pub struct InMemoryQuotationSink {
    records: Arc<Mutex<Vec<QuotationRecord>>>,
}

impl InMemoryQuotationSink {
    pub fn records(&self) -> Vec<QuotationRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl QuotationSink for InMemoryQuotationSink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, record: &QuotationRecord) -> Result<(), SinkError> {
        match self.records.lock() {
            Ok(mut records) => records.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
        Ok(())
    }
}

/// Sink used when persistence is switched off; records are only logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardingQuotationSink;

#[async_trait]
impl QuotationSink for DiscardingQuotationSink {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn append(&self, record: &QuotationRecord) -> Result<(), SinkError> {
        info!(
            event_name = "sink.discarded",
            quotation_id = %record.id.0,
            sender_id = %record.sender_id,
            material = %record.material,
            total_cost = record.total_cost,
            "persistence disabled, quotation discarded"
        );
        Ok(())
    }
}

/// Sink that always fails. Handy for exercising downstream-error paths.
#[derive(Clone, Debug)]
pub struct FailingQuotationSink {
    pub error: SinkError,
}

#[async_trait]
impl QuotationSink for FailingQuotationSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn append(&self, _record: &QuotationRecord) -> Result<(), SinkError> {
        Err(self.error.clone())
    }
}
