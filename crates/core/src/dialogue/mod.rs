pub mod engine;
pub mod messages;
pub mod service;
pub mod states;

pub use engine::{DialogueEngine, DialoguePolicy, DEFAULT_TRIGGER_PHRASE};
pub use messages::ReplyCatalog;
pub use service::{ConversationService, ConversationTurn};
pub use states::{
    DialogueAction, DialogueReply, DialogueStage, Session, SessionChange, TransitionOutcome,
};
