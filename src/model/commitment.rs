use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{CommitmentTierId, MetricId, SubscriptionId};

/// A contractual minimum usage charge for one metric on a subscription,
/// with an optional separate rate for usage beyond the commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentTier {
    pub id: CommitmentTierId,
    pub subscription_id: SubscriptionId,
    pub metric_id: MetricId,
    pub committed_amount: Decimal,
    pub rate: Decimal,
    pub overage_rate: Option<Decimal>,
    pub start: OffsetDateTime,
    pub end: Option<OffsetDateTime>,
}

impl CommitmentTier {
    /// Whether this commitment's active window intersects `[start, end]`.
    pub fn active_within(&self, start: OffsetDateTime, end: OffsetDateTime) -> bool {
        self.start <= end && self.end.map(|c_end| c_end >= start).unwrap_or(true)
    }

    /// The committed minimum charge, ignoring actual usage.
    pub fn committed_charge(&self) -> Decimal {
        self.committed_amount * self.rate
    }

    /// The charge actually incurred by `actual_usage`, applying the overage
    /// rate beyond the committed amount when one is configured.
    pub fn actual_charge(&self, actual_usage: Decimal) -> Decimal {
        match self.overage_rate {
            Some(overage_rate) if actual_usage > self.committed_amount => {
                self.committed_amount * self.rate + (actual_usage - self.committed_amount) * overage_rate
            }
            _ => actual_usage * self.rate,
        }
    }
}
