use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{BillingPeriodId, InvoiceId, SubscriptionId};

/// A `[start, end]` interval over which usage is aggregated and invoiced for
/// one subscription. Periods for a given subscription are contiguous and
/// non-overlapping; an event at time `T` belongs to the period whose
/// `start <= T <= end`, with ties at a shared boundary assigned to the
/// earlier period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub id: BillingPeriodId,
    pub subscription_id: SubscriptionId,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub invoice_id: Option<InvoiceId>,
}

impl BillingPeriod {
    /// Whether `at` belongs to this period under the earlier-period-wins
    /// boundary rule.
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}
