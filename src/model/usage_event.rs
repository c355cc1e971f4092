use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::ids::{BillingPeriodId, CustomerId, MetricId, SubscriptionId, UsageEventId};

/// An immutable record of one unit of usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: UsageEventId,
    pub customer_id: CustomerId,
    pub subscription_id: Option<SubscriptionId>,
    pub billing_period_id: Option<BillingPeriodId>,
    pub metric_name: String,
    pub metric_id: Option<MetricId>,
    pub quantity: Decimal,
    pub event_time: OffsetDateTime,
    pub properties: HashMap<String, Value>,
    pub created_at: OffsetDateTime,
}

impl UsageEvent {
    /// Reads a numeric property value, used by dimension-based pricing to
    /// resolve a dimension's rate multiplier input.
    pub fn numeric_property(&self, key: &str) -> Option<Decimal> {
        match self.properties.get(key) {
            Some(Value::Number(n)) => n.as_f64().and_then(Decimal::from_f64_retain),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }
}
