use serde::{Deserialize, Serialize};

use crate::domain::material::Material;
use crate::domain::quotation::{ContactInfo, Dimensions};
use crate::pricing::CostEstimate;

/// In-progress questionnaire. Each variant holds only the answers collected so far.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Session {
    AwaitingMaterial,
    AwaitingDimensions { material: Material },
    AwaitingQuantity { material: Material, dimensions: Dimensions },
    AwaitingConfirmation { estimate: CostEstimate },
    AwaitingContactInfo { estimate: CostEstimate },
}

impl Session {
    /// One-based questionnaire cursor.
    pub fn step(&self) -> u8 {
        match self {
            Self::AwaitingMaterial => 1,
            Self::AwaitingDimensions { .. } => 2,
            Self::AwaitingQuantity { .. } => 3,
            Self::AwaitingConfirmation { .. } => 4,
            Self::AwaitingContactInfo { .. } => 5,
        }
    }

    pub fn stage(&self) -> DialogueStage {
        match self {
            Self::AwaitingMaterial => DialogueStage::AwaitingMaterial,
            Self::AwaitingDimensions { .. } => DialogueStage::AwaitingDimensions,
            Self::AwaitingQuantity { .. } => DialogueStage::AwaitingQuantity,
            Self::AwaitingConfirmation { .. } => DialogueStage::AwaitingConfirmation,
            Self::AwaitingContactInfo { .. } => DialogueStage::AwaitingContactInfo,
        }
    }

    pub fn material(&self) -> Option<&Material> {
        match self {
            Self::AwaitingMaterial => None,
            Self::AwaitingDimensions { material } | Self::AwaitingQuantity { material, .. } => {
                Some(material)
            }
            Self::AwaitingConfirmation { estimate } | Self::AwaitingContactInfo { estimate } => {
                Some(&estimate.material)
            }
        }
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        match self {
            Self::AwaitingMaterial | Self::AwaitingDimensions { .. } => None,
            Self::AwaitingQuantity { dimensions, .. } => Some(*dimensions),
            Self::AwaitingConfirmation { estimate } | Self::AwaitingContactInfo { estimate } => {
                Some(estimate.dimensions)
            }
        }
    }

    pub fn estimate(&self) -> Option<&CostEstimate> {
        match self {
            Self::AwaitingConfirmation { estimate } | Self::AwaitingContactInfo { estimate } => {
                Some(estimate)
            }
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStage {
    NoSession,
    AwaitingMaterial,
    AwaitingDimensions,
    AwaitingQuantity,
    AwaitingConfirmation,
    AwaitingContactInfo,
}

impl DialogueStage {
    pub fn of(session: Option<&Session>) -> Self {
        session.map(Session::stage).unwrap_or(Self::NoSession)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSession => "no_session",
            Self::AwaitingMaterial => "awaiting_material",
            Self::AwaitingDimensions => "awaiting_dimensions",
            Self::AwaitingQuantity => "awaiting_quantity",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::AwaitingContactInfo => "awaiting_contact_info",
        }
    }
}

/// What the caller must do with the stored session after a transition.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionChange {
    Unchanged,
    Store(Session),
    Remove,
}

/// Reply intent. Rendered to user-facing text by `ReplyCatalog`.
#[derive(Clone, Debug, PartialEq)]
pub enum DialogueReply {
    NoActiveSession,
    MaterialPrompt { materials: Vec<String> },
    InvalidMaterial { materials: Vec<String> },
    DimensionsPrompt,
    InvalidDimensions,
    QuantityPrompt,
    InvalidQuantity,
    Summary { estimate: CostEstimate },
    ConfirmationReprompt,
    ContactPrompt,
    InvalidContact,
    Completed,
    Cancelled,
    PersistenceFailed,
    Unavailable,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DialogueAction {
    PersistQuotation { estimate: CostEstimate, contact: Option<ContactInfo> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionOutcome {
    pub from: DialogueStage,
    pub to: DialogueStage,
    pub session: SessionChange,
    pub reply: DialogueReply,
    pub action: Option<DialogueAction>,
}

impl TransitionOutcome {
    /// True when input was accepted and the dialogue moved on.
    pub fn advanced(&self) -> bool {
        self.from != self.to || matches!(self.session, SessionChange::Remove)
    }
}

#[cfg(test)]
mod tests {
    use super::{DialogueStage, Session};
    use crate::domain::material::Material;
    use crate::domain::quotation::Dimensions;

    #[test]
    fn steps_follow_questionnaire_order() {
        let material = Material::new("PP", 70.0);
        let dimensions = Dimensions::new(1.0, 2.0, 3.0);

        assert_eq!(Session::AwaitingMaterial.step(), 1);
        assert_eq!(Session::AwaitingDimensions { material: material.clone() }.step(), 2);
        assert_eq!(Session::AwaitingQuantity { material, dimensions }.step(), 3);
    }

    #[test]
    fn missing_session_maps_to_no_session_stage() {
        assert_eq!(DialogueStage::of(None), DialogueStage::NoSession);
        assert_eq!(
            DialogueStage::of(Some(&Session::AwaitingMaterial)).as_str(),
            "awaiting_material"
        );
    }

    #[test]
    fn accessors_expose_only_collected_fields() {
        let session = Session::AwaitingDimensions { material: Material::new("PC", 250.0) };

        assert_eq!(session.material().map(|m| m.name.as_str()), Some("PC"));
        assert_eq!(session.dimensions(), None);
        assert!(session.estimate().is_none());
    }
}
