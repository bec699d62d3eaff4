pub mod config;
pub mod dialogue;
pub mod domain;
pub mod errors;
pub mod pricing;
pub mod session;
pub mod sink;

pub use dialogue::{
    ConversationService, ConversationTurn, DialogueEngine, DialoguePolicy, DialogueReply,
    DialogueStage, ReplyCatalog, Session,
};
pub use domain::material::{Material, MaterialCatalog};
pub use domain::quotation::{ContactInfo, Dimensions, QuotationId, QuotationRecord};
pub use errors::{ApplicationError, DomainError};
pub use pricing::{CostCalculator, CostEstimate};
pub use session::{InMemorySessionStore, SessionStore, SessionStoreError};
pub use sink::{DiscardingQuotationSink, InMemoryQuotationSink, QuotationSink, SinkError};
