use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{CustomerId, PlanId, SubscriptionId};

/// A binding of one customer to one plan over an interval of time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
    pub start: OffsetDateTime,
    pub end: Option<OffsetDateTime>,
    pub active: bool,
}

impl Subscription {
    /// Whether `at` falls within this subscription's active interval,
    /// using the half-open, earlier-period-wins boundary convention used
    /// throughout the engine: `start <= at <= end` (or unbounded if `end`
    /// is `None`).
    pub fn covers(&self, at: OffsetDateTime) -> bool {
        self.start <= at && self.end.map(|end| end >= at).unwrap_or(true)
    }

    /// Whether this subscription's active interval intersects `[start, end]`.
    pub fn overlaps(&self, start: OffsetDateTime, end: OffsetDateTime) -> bool {
        self.start <= end && self.end.map(|s_end| s_end >= start).unwrap_or(true)
    }
}
