//! The metric registry: catalog CRUD plus composite-formula validation.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::error::{BillingError, Result};
use crate::formula;
use crate::ids::{IdSequence, MetricId};
use crate::model::{AggregationType, Formula, Metric, MetricKind, MetricRef};
use crate::store::MetricStore;

/// Creates a metric, validating the kind/aggregation enumerations and that
/// composite metrics carry a well-formed formula.
pub async fn create_metric(
    store: &impl MetricStore,
    sequence: &IdSequence,
    name: String,
    display_name: String,
    unit: String,
    kind: MetricKind,
    aggregation: AggregationType,
    formula: Option<Formula>,
    display_properties: HashMap<String, String>,
) -> Result<Metric> {
    if kind == MetricKind::Composite && formula.is_none() {
        return Err(BillingError::validation(
            "formula",
            "composite metrics require a formula",
        ));
    }
    if let Some(ref formula) = formula {
        validate_formula(formula)?;
    }

    let metric = Metric {
        id: MetricId::from(sequence.next()),
        name,
        display_name,
        unit,
        kind,
        aggregation,
        formula,
        display_properties,
    };
    store.insert_metric(metric).await
}

/// Updates an existing metric in place, re-validating its formula if one is
/// present.
pub async fn update_metric(store: &impl MetricStore, metric: Metric) -> Result<Metric> {
    if metric.kind == MetricKind::Composite && metric.formula.is_none() {
        return Err(BillingError::validation(
            "formula",
            "composite metrics require a formula",
        ));
    }
    if let Some(ref formula) = metric.formula {
        validate_formula(formula)?;
    }
    store.update_metric(metric).await
}

pub async fn delete_metric(store: &impl MetricStore, id: MetricId) -> Result<()> {
    store.delete_metric(id).await
}

pub async fn get_metric(store: &impl MetricStore, reference: impl Into<MetricRef>) -> Result<Metric> {
    store.get_metric(&reference.into()).await
}

pub async fn list_metrics(store: &impl MetricStore) -> Result<Vec<Metric>> {
    store.list_metrics().await
}

fn validate_formula(formula: &Formula) -> Result<()> {
    match formula {
        Formula::Arithmetic { expression, .. } => formula::validate_syntax(expression)
            .map_err(|e| BillingError::validation("formula", e.to_string())),
        Formula::Function { name, .. } if name == "weighted_sum" => Ok(()),
        Formula::Function { name, .. } => Err(BillingError::validation(
            "formula",
            format!("unknown formula function '{name}'"),
        )),
    }
}

/// Evaluates a composite metric's formula against the raw inputs aggregated
/// for its source metrics.
pub fn evaluate_composite(metric: &Metric, inputs: &HashMap<String, Decimal>) -> Result<Decimal> {
    let formula = metric.formula.as_ref().ok_or_else(|| {
        BillingError::state_violation("metric", format!("{} has no formula", metric.name))
    })?;
    match formula {
        Formula::Arithmetic {
            expression,
            variables,
        } => formula::evaluate_arithmetic(expression, variables, inputs)
            .map_err(|e| BillingError::validation("formula", e.to_string())),
        Formula::Function { name, args } => formula::evaluate_function(name, &args.weights, inputs)
            .map_err(|e| BillingError::validation("formula", e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn composite_without_formula_is_rejected() {
        let store = MemoryStore::new();
        let sequence = IdSequence::new();
        let err = create_metric(
            &store,
            &sequence,
            "derived".into(),
            "Derived".into(),
            "units".into(),
            MetricKind::Composite,
            AggregationType::Sum,
            None,
            HashMap::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BillingError::ValidationFailure { .. }));
    }

    #[tokio::test]
    async fn duplicate_name_is_a_conflict() {
        let store = MemoryStore::new();
        let sequence = IdSequence::new();
        create_metric(
            &store,
            &sequence,
            "api_calls".into(),
            "API Calls".into(),
            "calls".into(),
            MetricKind::Counter,
            AggregationType::Sum,
            None,
            HashMap::new(),
        )
        .await
        .unwrap();
        let err = create_metric(
            &store,
            &sequence,
            "api_calls".into(),
            "API Calls Again".into(),
            "calls".into(),
            MetricKind::Counter,
            AggregationType::Sum,
            None,
            HashMap::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BillingError::Conflict { .. }));
    }
}
