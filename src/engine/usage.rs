//! The usage aggregator: sums event quantities by metric over a date range,
//! plus the per-dimension totals `dimension_based` pricing needs.

use std::collections::HashMap;

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::error::Result;
use crate::ids::CustomerId;
use crate::model::UsageEvent;
use crate::store::EventStore;

/// The aggregated usage for one customer over one range.
#[derive(Debug, Clone, Default)]
pub struct UsageSummary {
    /// Total quantity per metric name.
    pub usage_by_metric: HashMap<String, Decimal>,
    /// Per metric name, the summed numeric value of each usage-event
    /// property key observed — the input `dimension_based` pricing draws
    /// its per-dimension value from, since price components only see
    /// aggregated totals rather than raw events.
    pub dimension_totals: HashMap<String, HashMap<String, Decimal>>,
}

impl UsageSummary {
    pub fn quantity_for(&self, metric_name: &str) -> Decimal {
        self.usage_by_metric
            .get(metric_name)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn dimensions_for(&self, metric_name: &str) -> HashMap<String, Decimal> {
        self.dimension_totals
            .get(metric_name)
            .cloned()
            .unwrap_or_default()
    }
}

/// Aggregates usage for `customer_id` over `[start, end]`, summing both raw
/// quantities and numeric event properties per metric.
pub async fn aggregate(
    store: &impl EventStore,
    customer_id: CustomerId,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<UsageSummary> {
    let events = store
        .list_events_for_customer_in_range(customer_id, start, end)
        .await?;
    Ok(summarize(&events))
}

fn summarize(events: &[UsageEvent]) -> UsageSummary {
    let mut summary = UsageSummary::default();
    for event in events {
        *summary
            .usage_by_metric
            .entry(event.metric_name.clone())
            .or_insert(Decimal::ZERO) += event.quantity;

        let metric_dimensions = summary
            .dimension_totals
            .entry(event.metric_name.clone())
            .or_default();
        for (key, _) in &event.properties {
            if let Some(value) = event.numeric_property(key) {
                *metric_dimensions.entry(key.clone()).or_insert(Decimal::ZERO) += value;
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CustomerId, MetricId, UsageEventId};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use time::macros::datetime;

    fn event(quantity: Decimal, properties: HashMap<String, serde_json::Value>) -> UsageEvent {
        UsageEvent {
            id: UsageEventId(1),
            customer_id: CustomerId(1),
            subscription_id: None,
            billing_period_id: None,
            metric_name: "api_calls".into(),
            metric_id: None::<MetricId>,
            quantity,
            event_time: datetime!(2024-01-01 00:00:00 UTC),
            properties,
            created_at: datetime!(2024-01-01 00:00:00 UTC),
        }
    }

    #[test]
    fn sums_quantities_and_dimension_properties() {
        let mut props = HashMap::new();
        props.insert("region_weight".to_string(), json!(2));
        let events = vec![event(dec!(10), props.clone()), event(dec!(5), props)];
        let summary = summarize(&events);
        assert_eq!(summary.quantity_for("api_calls"), dec!(15));
        assert_eq!(
            summary.dimensions_for("api_calls").get("region_weight"),
            Some(&dec!(4))
        );
    }

    #[test]
    fn aggregation_commutes_with_splitting() {
        let events = vec![event(dec!(10), HashMap::new()), event(dec!(20), HashMap::new())];
        let whole = summarize(&events);
        let a = summarize(&events[..1]);
        let b = summarize(&events[1..]);
        assert_eq!(
            whole.quantity_for("api_calls"),
            a.quantity_for("api_calls") + b.quantity_for("api_calls")
        );
    }
}
