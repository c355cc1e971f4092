//! The pricing evaluator: turns one [`PriceComponent`] and a usage quantity
//! into `(charge, effective_unit_price, description)`.
//!
//! An unrecognized or malformed combination never fails the surrounding
//! invoice assembly (spec: "a single misconfigured component must not block
//! billing of all other components") — it returns a zero charge and a
//! diagnostic description instead, logged at `warn!` by the caller.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::debug;

use crate::model::{DimensionRate, PriceComponent, PricingDetails, ThresholdFee, Tier, VolumeTier};

/// The result of evaluating one price component at one usage quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingResult {
    pub charge: Decimal,
    pub unit_price: Decimal,
    pub description: String,
}

/// Evaluates `component` at usage quantity `quantity`.
///
/// `dimension_inputs` supplies the per-dimension value used by
/// `dimension_based` pricing (the usage-event property named by each
/// dimension's `value_key`, summed over the aggregation range); it is
/// ignored by every other pricing type.
pub fn evaluate(
    component: &PriceComponent,
    quantity: Decimal,
    dimension_inputs: &HashMap<String, Decimal>,
) -> PricingResult {
    let display = &component.display_name;
    let result = match &component.pricing_details {
        PricingDetails::Flat { amount } => PricingResult {
            charge: *amount,
            unit_price: *amount,
            description: format!("{display}: flat fee"),
        },
        PricingDetails::Subscription { amount } => PricingResult {
            charge: *amount,
            unit_price: *amount,
            description: format!("{display}: subscription fee"),
        },
        PricingDetails::Tiered { tiers } => evaluate_tiered(display, tiers, quantity),
        PricingDetails::Volume { tiers } => evaluate_volume(display, tiers, quantity, false),
        PricingDetails::Graduated { tiers } => evaluate_volume(display, tiers, quantity, true),
        PricingDetails::Package {
            package_size,
            package_price,
        } => evaluate_package(display, *package_size, *package_price, quantity),
        PricingDetails::Threshold { thresholds } => evaluate_threshold(display, thresholds, quantity),
        PricingDetails::UsageBasedSubscription {
            base_fee,
            usage_price,
        } => evaluate_usage_based_subscription(display, *base_fee, *usage_price, quantity),
        PricingDetails::TimeBased { rate_per_unit, unit } => {
            evaluate_time_based(display, *rate_per_unit, unit, quantity)
        }
        PricingDetails::DimensionBased {
            base_rate,
            dimensions,
        } => evaluate_dimension_based(display, *base_rate, dimensions, quantity, dimension_inputs),
        PricingDetails::Dynamic { base_rate, .. } => evaluate_dynamic(display, *base_rate, quantity),
    };
    debug!(component = %display, %quantity, charge = %result.charge, "evaluated price component");
    result
}

fn unit_price_of(charge: Decimal, quantity: Decimal) -> Decimal {
    if quantity.is_zero() {
        Decimal::ZERO
    } else {
        charge / quantity
    }
}

fn evaluate_tiered(display: &str, tiers: &[Tier], quantity: Decimal) -> PricingResult {
    let mut sorted: Vec<&Tier> = tiers.iter().collect();
    sorted.sort_by(|a, b| a.start.cmp(&b.start));

    let mut charge = Decimal::ZERO;
    let mut remaining = quantity;
    for tier in sorted {
        if remaining <= Decimal::ZERO {
            break;
        }
        if tier.start > quantity {
            break;
        }
        let tier_width = match tier.end {
            Some(end) => (end - tier.start).max(Decimal::ZERO),
            None => remaining,
        };
        let usage_in_tier = remaining.min(tier_width);
        charge += usage_in_tier * tier.price;
        remaining -= usage_in_tier;
    }

    PricingResult {
        charge,
        unit_price: unit_price_of(charge, quantity),
        description: format!("{display}: tiered usage ({quantity} units)"),
    }
}

fn evaluate_volume(
    display: &str,
    tiers: &[VolumeTier],
    quantity: Decimal,
    graduated: bool,
) -> PricingResult {
    let mut sorted: Vec<&VolumeTier> = tiers.iter().collect();
    sorted.sort_by(|a, b| b.start.cmp(&a.start));

    let selected = sorted
        .iter()
        .find(|tier| tier.start <= quantity)
        .copied()
        .or_else(|| tiers.first());

    let Some(tier) = selected else {
        return PricingResult {
            charge: Decimal::ZERO,
            unit_price: Decimal::ZERO,
            description: format!("{display}: no tiers configured"),
        };
    };

    let charge = quantity * tier.price;
    let description = if graduated {
        format!("{display}: graduated rate for {}+", tier.start)
    } else {
        format!("{display}: volume pricing @ {}/unit", tier.price)
    };
    PricingResult {
        charge,
        unit_price: tier.price,
        description,
    }
}

fn evaluate_package(
    display: &str,
    package_size: Decimal,
    package_price: Decimal,
    quantity: Decimal,
) -> PricingResult {
    let packages = if package_size.is_zero() {
        Decimal::ZERO
    } else {
        (quantity / package_size).ceil()
    };
    let charge = packages * package_price;
    PricingResult {
        charge,
        unit_price: unit_price_of(charge, quantity),
        description: format!("{display}: {packages} package(s) of {package_size}"),
    }
}

fn evaluate_threshold(
    display: &str,
    thresholds: &[ThresholdFee],
    quantity: Decimal,
) -> PricingResult {
    let crossed: Vec<&ThresholdFee> = thresholds
        .iter()
        .filter(|t| quantity >= t.threshold)
        .collect();
    let charge: Decimal = crossed.iter().map(|t| t.price).sum();
    let description = format!("{display}: {} threshold(s) crossed", crossed.len());
    PricingResult {
        charge,
        unit_price: unit_price_of(charge, quantity),
        description,
    }
}

fn evaluate_usage_based_subscription(
    display: &str,
    base_fee: Decimal,
    usage_price: Decimal,
    quantity: Decimal,
) -> PricingResult {
    let charge = base_fee + quantity * usage_price;
    let unit_price = if quantity.is_zero() {
        base_fee
    } else {
        charge / quantity
    };
    PricingResult {
        charge,
        unit_price,
        description: format!("{display}: base fee plus usage"),
    }
}

fn evaluate_time_based(
    display: &str,
    rate_per_unit: Decimal,
    unit: &str,
    quantity: Decimal,
) -> PricingResult {
    let charge = quantity * rate_per_unit;
    PricingResult {
        charge,
        unit_price: unit_price_of(charge, quantity),
        description: format!("{display}: {quantity} {unit}"),
    }
}

fn evaluate_dimension_based(
    display: &str,
    base_rate: Decimal,
    dimensions: &HashMap<String, DimensionRate>,
    quantity: Decimal,
    dimension_inputs: &HashMap<String, Decimal>,
) -> PricingResult {
    let mut rate = base_rate;
    for dimension in dimensions.values() {
        let value = dimension_inputs
            .get(&dimension.value_key)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let factor = value * dimension.multiplier;
        rate *= Decimal::ONE + factor;
    }
    let charge = quantity * rate;
    PricingResult {
        charge,
        unit_price: unit_price_of(charge, quantity),
        description: format!("{display}: dimension-adjusted rate"),
    }
}

fn evaluate_dynamic(display: &str, base_rate: Decimal, quantity: Decimal) -> PricingResult {
    let charge = quantity * base_rate;
    PricingResult {
        charge,
        unit_price: unit_price_of(charge, quantity),
        description: format!("{display}: dynamic rate (formula informational only)"),
    }
}

/// Returned for a price component whose type is not recognized by this
/// evaluator. Per spec this is not an error: it is reported inline on the
/// invoice.
pub fn unknown(display: &str) -> PricingResult {
    PricingResult {
        charge: Decimal::ZERO,
        unit_price: Decimal::ZERO,
        description: format!("Unknown pricing type for {display}"),
    }
}
