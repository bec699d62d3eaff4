use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Resin types offered out of the box, with their cost in baht per kilogram.
pub const STANDARD_MATERIALS: &[(&str, f64)] = &[
    ("ABS", 200.0),
    ("PC", 250.0),
    ("Nylon", 350.0),
    ("PP", 70.0),
    ("PE", 60.0),
    ("PVC", 90.0),
    ("PET", 100.0),
    ("PMMA", 150.0),
    ("POM", 350.0),
    ("PU", 400.0),
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub cost_per_kg: f64,
}

impl Material {
    pub fn new(name: impl Into<String>, cost_per_kg: f64) -> Self {
        Self { name: name.into(), cost_per_kg }
    }
}

/// Ordered set of selectable materials. Order is the order shown to users.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialCatalog {
    materials: Vec<Material>,
}

impl MaterialCatalog {
    pub fn new(materials: Vec<Material>) -> Result<Self, DomainError> {
        if materials.is_empty() {
            return Err(DomainError::InvalidCatalog("material catalog is empty".to_owned()));
        }

        let mut seen = HashSet::new();
        for material in &materials {
            let key = material.name.trim().to_uppercase();
            if key.is_empty() {
                return Err(DomainError::InvalidCatalog("material name is empty".to_owned()));
            }
            if !seen.insert(key) {
                return Err(DomainError::InvalidCatalog(format!(
                    "material `{}` is listed more than once",
                    material.name
                )));
            }
            if !material.cost_per_kg.is_finite() || material.cost_per_kg < 0.0 {
                return Err(DomainError::InvalidCatalog(format!(
                    "material `{}` has invalid cost_per_kg {}",
                    material.name, material.cost_per_kg
                )));
            }
        }

        Ok(Self { materials })
    }

    pub fn standard() -> Self {
        Self {
            materials: STANDARD_MATERIALS
                .iter()
                .map(|(name, cost)| Material::new(*name, *cost))
                .collect(),
        }
    }

    /// Matches user input against material names after uppercasing both sides.
    pub fn lookup(&self, input: &str) -> Option<&Material> {
        let wanted = input.trim().to_uppercase();
        if wanted.is_empty() {
            return None;
        }
        self.materials.iter().find(|material| material.name.to_uppercase() == wanted)
    }

    pub fn names(&self) -> Vec<&str> {
        self.materials.iter().map(|material| material.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl Default for MaterialCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
