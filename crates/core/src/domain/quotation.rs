use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pricing::CostEstimate;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotationId(pub String);

impl QuotationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Width, length and height of one moulded part, in centimetres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width_cm: f64,
    pub length_cm: f64,
    pub height_cm: f64,
}

impl Dimensions {
    pub fn new(width_cm: f64, length_cm: f64, height_cm: f64) -> Self {
        Self { width_cm, length_cm, height_cm }
    }

    pub fn volume_cm3(&self) -> f64 {
        self.width_cm * self.length_cm * self.height_cm
    }

    pub fn is_positive(&self) -> bool {
        self.width_cm > 0.0 && self.length_cm > 0.0 && self.height_cm > 0.0
    }

    /// Size descriptor stored alongside persisted quotations, e.g. `10.5x15x5`.
    pub fn descriptor(&self) -> String {
        format!("{}x{}x{}", self.width_cm, self.length_cm, self.height_cm)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub phone: String,
    pub email: String,
}

/// Flat row appended to the persistence sink once a dialogue completes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuotationRecord {
    pub id: QuotationId,
    pub sender_id: String,
    pub material: String,
    pub size: String,
    pub volume_cm3: f64,
    pub weight_kg: f64,
    pub quantity: u32,
    pub total_cost: f64,
    pub contact: Option<ContactInfo>,
    pub created_at: DateTime<Utc>,
}

impl QuotationRecord {
    pub fn from_estimate(
        sender_id: impl Into<String>,
        estimate: &CostEstimate,
        contact: Option<ContactInfo>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: QuotationId::generate(),
            sender_id: sender_id.into(),
            material: estimate.material.name.clone(),
            size: estimate.dimensions.descriptor(),
            volume_cm3: estimate.volume_cm3,
            weight_kg: estimate.weight_kg,
            quantity: estimate.quantity,
            total_cost: estimate.total_cost,
            contact,
            created_at,
        }
    }
}
