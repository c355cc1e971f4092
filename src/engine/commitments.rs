//! The commitment engine: per-metric minimum billable charges that can
//! override usage-based pricing, with an optional overage rate beyond the
//! commitment.

use std::collections::HashMap;

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::ids::MetricId;
use crate::model::CommitmentTier;

/// A commitment whose minimum charge exceeds the metric's actual
/// usage-based charge, keyed by metric id.
pub type CommitmentOverrides = HashMap<MetricId, Decimal>;

/// Evaluates every commitment active within `[start, end]` against
/// `usage_by_metric_id`, returning the subset whose committed charge is
/// strictly greater than the actual usage charge — the only case in which
/// the commitment overrides the component's own pricing.
pub fn evaluate_commitments(
    commitments: &[CommitmentTier],
    start: OffsetDateTime,
    end: OffsetDateTime,
    usage_by_metric_id: &HashMap<MetricId, Decimal>,
) -> CommitmentOverrides {
    let mut overrides = CommitmentOverrides::new();
    for commitment in commitments {
        if !commitment.active_within(start, end) {
            continue;
        }
        let actual_usage = usage_by_metric_id
            .get(&commitment.metric_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let committed_charge = commitment.committed_charge();
        let actual_charge = commitment.actual_charge(actual_usage);
        if committed_charge > actual_charge {
            overrides.insert(commitment.metric_id, committed_charge);
        }
    }
    overrides
}
