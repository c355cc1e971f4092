use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{MetricId, PlanId, PriceComponentId};

/// How often a plan's subscriptions are invoiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingFrequency {
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingFrequency {
    /// Normalizes any out-of-enumeration value to `Monthly`, per the plan
    /// store's validation rule.
    pub fn normalize_str(value: &str) -> BillingFrequency {
        match value {
            "quarterly" => BillingFrequency::Quarterly,
            "yearly" => BillingFrequency::Yearly,
            "monthly" => BillingFrequency::Monthly,
            _ => BillingFrequency::Monthly,
        }
    }
}

/// The tagged pricing-rule discriminator. Each variant's behavior is defined
/// by the pricing evaluator; validity of `pricing_details` against the
/// variant is checked at price-component creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingType {
    Flat,
    Tiered,
    Volume,
    Package,
    Graduated,
    Threshold,
    Subscription,
    UsageBasedSubscription,
    Dynamic,
    TimeBased,
    DimensionBased,
}

impl PricingType {
    /// Whether this pricing type is a recurring fee independent of usage,
    /// per the invoice assembler's treatment of `{flat, subscription}`.
    pub fn is_fixed_fee(self) -> bool {
        matches!(self, PricingType::Flat | PricingType::Subscription)
    }
}

/// One tier in [`PricingDetails::Tiered`]: usage between `start` and `end`
/// (exclusive, or unbounded when `end` is `None`) is billed at `price` per
/// unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub start: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<Decimal>,
    pub price: Decimal,
}

/// One tier in [`PricingDetails::Volume`] / [`PricingDetails::Graduated`]:
/// the entire usage quantity is billed at the rate of the highest tier whose
/// `start` is at or below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeTier {
    pub start: Decimal,
    pub price: Decimal,
}

/// One entry in [`PricingDetails::Threshold`]: a one-shot fee charged once
/// usage reaches `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdFee {
    pub threshold: Decimal,
    pub price: Decimal,
}

/// A per-dimension rate multiplier in [`PricingDetails::DimensionBased`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRate {
    /// The usage-event property key whose value feeds the multiplier.
    pub value_key: String,
    pub multiplier: Decimal,
}

/// The pricing-type-specific payload bound to one [`PriceComponent`].
///
/// The variant names and field shapes mirror the pricing evaluator's
/// schema table exactly; validation at creation time rejects a
/// `pricing_details` shape that does not match the declared
/// [`PricingType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PricingDetails {
    Flat { amount: Decimal },
    Subscription { amount: Decimal },
    Tiered { tiers: Vec<Tier> },
    Volume { tiers: Vec<VolumeTier> },
    Graduated { tiers: Vec<VolumeTier> },
    Package { package_size: Decimal, package_price: Decimal },
    Threshold { thresholds: Vec<ThresholdFee> },
    UsageBasedSubscription { base_fee: Decimal, usage_price: Decimal },
    TimeBased { rate_per_unit: Decimal, unit: String },
    DimensionBased {
        base_rate: Decimal,
        dimensions: HashMap<String, DimensionRate>,
    },
    Dynamic { base_rate: Decimal, formula: String },
}

impl PricingDetails {
    /// The [`PricingType`] this payload shape corresponds to.
    pub fn pricing_type(&self) -> PricingType {
        match self {
            PricingDetails::Flat { .. } => PricingType::Flat,
            PricingDetails::Subscription { .. } => PricingType::Subscription,
            PricingDetails::Tiered { .. } => PricingType::Tiered,
            PricingDetails::Volume { .. } => PricingType::Volume,
            PricingDetails::Graduated { .. } => PricingType::Graduated,
            PricingDetails::Package { .. } => PricingType::Package,
            PricingDetails::Threshold { .. } => PricingType::Threshold,
            PricingDetails::UsageBasedSubscription { .. } => PricingType::UsageBasedSubscription,
            PricingDetails::TimeBased { .. } => PricingType::TimeBased,
            PricingDetails::DimensionBased { .. } => PricingType::DimensionBased,
            PricingDetails::Dynamic { .. } => PricingType::Dynamic,
        }
    }
}

/// One pricing rule within a plan, bound to a metric by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceComponent {
    pub id: PriceComponentId,
    pub plan_id: PlanId,
    /// The metric this component is priced against.
    pub metric_name: String,
    /// Optionally pins the metric by id as well as by name.
    pub metric_id: Option<MetricId>,
    /// A human-readable label used in invoice line-item descriptions.
    pub display_name: String,
    pub pricing_details: PricingDetails,
}

/// A billable product: a named, ordered collection of price components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub description: String,
    pub billing_frequency: BillingFrequency,
    pub active: bool,
    /// Price components in the order they were added; evaluation order
    /// during invoice assembly follows this ordering.
    pub components: Vec<PriceComponent>,
}
