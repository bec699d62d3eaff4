//! Unit-cost estimation for moulded parts.
//!
//! `volume = w * l * h` (cm³), `weight_kg = volume * density / 1000` and
//! `total_cost = weight_kg * quantity * cost_per_kg`. Density is applied
//! uniformly to every material. Values are never rounded here; rounding only
//! happens in [`format_amount`].

use serde::{Deserialize, Serialize};

use crate::domain::material::Material;
use crate::domain::quotation::Dimensions;
use crate::errors::DomainError;

pub const STANDARD_DENSITY_G_PER_CM3: f64 = 1.05;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub material: Material,
    pub dimensions: Dimensions,
    pub quantity: u32,
    pub volume_cm3: f64,
    /// Weight of a single part.
    pub weight_kg: f64,
    pub total_cost: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostCalculator {
    density_g_per_cm3: f64,
}

impl CostCalculator {
    pub fn new(density_g_per_cm3: f64) -> Result<Self, DomainError> {
        if !density_g_per_cm3.is_finite() || density_g_per_cm3 <= 0.0 {
            return Err(DomainError::InvariantViolation(format!(
                "density must be a positive number, got {density_g_per_cm3}"
            )));
        }
        Ok(Self { density_g_per_cm3 })
    }

    pub fn estimate(&self, material: &Material, dimensions: Dimensions, quantity: u32) -> CostEstimate {
        let volume_cm3 = dimensions.volume_cm3();
        let weight_kg = volume_cm3 * self.density_g_per_cm3 / 1000.0;
        let total_cost = weight_kg * f64::from(quantity) * material.cost_per_kg;

        CostEstimate {
            material: material.clone(),
            dimensions,
            quantity,
            volume_cm3,
            weight_kg,
            total_cost,
        }
    }
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self { density_g_per_cm3: STANDARD_DENSITY_G_PER_CM3 }
    }
}

/// Two decimals with comma thousands separators, e.g. `7,350.00`.
pub fn format_amount(value: f64) -> String {
    format_with_precision(value, 2)
}

pub fn format_with_precision(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let rendered = format!("{:.*}", precision, value.abs());
    let (integer, fraction) = match rendered.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (rendered.as_str(), None),
    };

    let mut grouped = String::with_capacity(rendered.len() + integer.len() / 3 + 1);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(fraction) = fraction {
        grouped.push('.');
        grouped.push_str(fraction);
    }

    let is_zero = rendered.chars().all(|ch| ch == '0' || ch == '.');
    if value.is_sign_negative() && !is_zero {
        format!("-{grouped}")
    } else {
        grouped
    }
}
