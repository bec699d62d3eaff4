use moldquote_core::dialogue::engine::parse_dimensions;
use moldquote_core::pricing::format_amount;
use serde_json::json;

use crate::commands::{load_config, CommandResult};

/// Prices one part offline with the configured material table and density.
pub fn run(material: &str, dimensions: &str, quantity: u32) -> CommandResult {
    let config = match load_config("estimate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let (catalog, calculator) = match config.pricing.catalog().and_then(|catalog| {
        config.pricing.calculator().map(|calculator| (catalog, calculator))
    }) {
        Ok(pair) => pair,
        Err(error) => {
            return CommandResult::failure(
                "estimate",
                "config_validation",
                format!("pricing table unusable: {error}"),
                2,
            )
        }
    };

    let Some(material) = catalog.lookup(material) else {
        return CommandResult::failure(
            "estimate",
            "invalid_input",
            format!("unknown material `{material}`, expected one of: {}", catalog.names().join(", ")),
            2,
        );
    };
    let Some(dimensions) = parse_dimensions(dimensions) else {
        return CommandResult::failure(
            "estimate",
            "invalid_input",
            format!("dimensions `{dimensions}` must look like `10x20x5` (centimetres)"),
            2,
        );
    };
    if quantity == 0 {
        return CommandResult::failure(
            "estimate",
            "invalid_input",
            "quantity must be a positive integer",
            2,
        );
    }
    if config.dialogue.reject_non_positive_dimensions && !dimensions.is_positive() {
        return CommandResult::failure(
            "estimate",
            "invalid_input",
            "every dimension must be greater than zero",
            2,
        );
    }

    let estimate = calculator.estimate(material, dimensions, quantity);
    if !estimate.total_cost.is_finite() {
        return CommandResult::failure(
            "estimate",
            "invalid_input",
            "dimensions and quantity are too large to price",
            2,
        );
    }
    let total_display = format_amount(estimate.total_cost);
    let message = format!(
        "{} x{} of {}: {} {}",
        estimate.dimensions.descriptor(),
        estimate.quantity,
        estimate.material.name,
        total_display,
        config.pricing.currency_label
    );

    CommandResult::success_with_data(
        "estimate",
        message,
        Some(json!({
            "material": estimate.material.name,
            "size": estimate.dimensions.descriptor(),
            "volume_cm3": estimate.volume_cm3,
            "weight_kg": estimate.weight_kg,
            "quantity": estimate.quantity,
            "total_cost": estimate.total_cost,
            "total_display": total_display,
            "currency": config.pricing.currency_label,
        })),
    )
}
