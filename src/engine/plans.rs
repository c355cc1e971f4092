//! Plans and their ordered price components.
//!
//! `pricing_details` is a tagged Rust enum, so a component's pricing type
//! and its payload shape can never disagree the way the source's separate
//! `pricing_type` string and JSON blob could; validation here is limited to
//! what the type system cannot already guarantee (billing-frequency
//! normalization, `dynamic`'s formula syntax).

use crate::error::{BillingError, Result};
use crate::formula;
use crate::ids::{IdSequence, PlanId, PriceComponentId};
use crate::model::{BillingFrequency, Plan, PriceComponent, PricingDetails};
use crate::store::PlanStore;

/// Creates a plan, optionally seeded with price components.
pub async fn create_plan(
    store: &impl PlanStore,
    sequence: &IdSequence,
    component_sequence: &IdSequence,
    name: String,
    description: String,
    billing_frequency: &str,
    components: Vec<NewPriceComponent>,
) -> Result<Plan> {
    let plan_id = PlanId::from(sequence.next());
    let mut built_components = Vec::with_capacity(components.len());
    for spec in components {
        built_components.push(build_component(component_sequence, plan_id, spec)?);
    }

    let plan = Plan {
        id: plan_id,
        name,
        description,
        billing_frequency: BillingFrequency::normalize_str(billing_frequency),
        active: true,
        components: built_components,
    };
    store.insert_plan(plan).await
}

/// The caller-supplied shape of a new price component, before an id is
/// assigned.
pub struct NewPriceComponent {
    pub metric_name: String,
    pub metric_id: Option<crate::ids::MetricId>,
    pub display_name: String,
    pub pricing_details: PricingDetails,
}

fn build_component(
    sequence: &IdSequence,
    plan_id: PlanId,
    spec: NewPriceComponent,
) -> Result<PriceComponent> {
    validate_pricing_details(&spec.pricing_details)?;
    Ok(PriceComponent {
        id: PriceComponentId::from(sequence.next()),
        plan_id,
        metric_name: spec.metric_name,
        metric_id: spec.metric_id,
        display_name: spec.display_name,
        pricing_details: spec.pricing_details,
    })
}

fn validate_pricing_details(details: &PricingDetails) -> Result<()> {
    match details {
        PricingDetails::Dynamic { formula, .. } => formula::validate_syntax(formula)
            .map_err(|e| BillingError::validation("pricing_details.formula", e.to_string())),
        PricingDetails::Tiered { tiers } if tiers.is_empty() => Err(BillingError::validation(
            "pricing_details.tiers",
            "tiered pricing requires at least one tier",
        )),
        PricingDetails::Volume { tiers } | PricingDetails::Graduated { tiers } if tiers.is_empty() => {
            Err(BillingError::validation(
                "pricing_details.tiers",
                "volume/graduated pricing requires at least one tier",
            ))
        }
        PricingDetails::Package { package_size, .. } if package_size.is_sign_negative() || package_size.is_zero() => {
            Err(BillingError::validation(
                "pricing_details.package_size",
                "package_size must be positive",
            ))
        }
        _ => Ok(()),
    }
}

/// Adds a price component to an existing plan.
pub async fn add_component(
    store: &impl PlanStore,
    sequence: &IdSequence,
    plan_id: PlanId,
    spec: NewPriceComponent,
) -> Result<Plan> {
    let mut plan = store.get_plan(plan_id).await?;
    let component = build_component(sequence, plan_id, spec)?;
    plan.components.push(component);
    store.update_plan(plan).await
}

/// Removes a price component from a plan by id.
pub async fn remove_component(
    store: &impl PlanStore,
    plan_id: PlanId,
    component_id: PriceComponentId,
) -> Result<Plan> {
    let mut plan = store.get_plan(plan_id).await?;
    let before = plan.components.len();
    plan.components.retain(|c| c.id != component_id);
    if plan.components.len() == before {
        return Err(BillingError::not_found("price_component", component_id.to_string()));
    }
    store.update_plan(plan).await
}

/// Sets `active = false`. Does not cascade to existing subscriptions.
pub async fn deactivate_plan(store: &impl PlanStore, plan_id: PlanId) -> Result<Plan> {
    let mut plan = store.get_plan(plan_id).await?;
    plan.active = false;
    store.update_plan(plan).await
}

pub async fn update_plan(store: &impl PlanStore, plan: Plan) -> Result<Plan> {
    for component in &plan.components {
        validate_pricing_details(&component.pricing_details)?;
    }
    store.update_plan(plan).await
}

pub async fn get_plan(store: &impl PlanStore, plan_id: PlanId) -> Result<Plan> {
    store.get_plan(plan_id).await
}

pub async fn list_plans(store: &impl PlanStore, active_only: bool) -> Result<Vec<Plan>> {
    let plans = store.list_plans().await?;
    Ok(if active_only {
        plans.into_iter().filter(|p| p.active).collect()
    } else {
        plans
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn dynamic_pricing_with_bad_formula_is_rejected() {
        let store = MemoryStore::new();
        let sequence = IdSequence::new();
        let component_sequence = IdSequence::new();
        let err = create_plan(
            &store,
            &sequence,
            &component_sequence,
            "Plan".into(),
            "".into(),
            "monthly",
            vec![NewPriceComponent {
                metric_name: "api_calls".into(),
                metric_id: None,
                display_name: "API Calls".into(),
                pricing_details: PricingDetails::Dynamic {
                    base_rate: dec!(0.01),
                    formula: "1 + ; DROP".into(),
                },
            }],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BillingError::ValidationFailure { .. }));
    }

    #[tokio::test]
    async fn unknown_billing_frequency_normalizes_to_monthly() {
        let store = MemoryStore::new();
        let sequence = IdSequence::new();
        let component_sequence = IdSequence::new();
        let plan = create_plan(
            &store,
            &sequence,
            &component_sequence,
            "Plan".into(),
            "".into(),
            "fortnightly",
            vec![],
        )
        .await
        .unwrap();
        assert_eq!(plan.billing_frequency, BillingFrequency::Monthly);
    }
}
