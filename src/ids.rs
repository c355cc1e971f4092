use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Declares an opaque integer identifier newtype, unique within its own
/// entity kind as required by the data model.
macro_rules! id_type {
    ($name:ident, $display:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $display, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                $name(value)
            }
        }
    };
}

id_type!(CustomerId, "cust");
id_type!(MetricId, "metric");
id_type!(PlanId, "plan");
id_type!(PriceComponentId, "pc");
id_type!(SubscriptionId, "sub");
id_type!(BillingPeriodId, "bp");
id_type!(UsageEventId, "evt");
id_type!(InvoiceId, "inv");
id_type!(InvoiceItemId, "item");
id_type!(CommitmentTierId, "commit");
id_type!(CreditBalanceId, "credit");
id_type!(CreditTransactionId, "credit-txn");

/// A monotonically increasing id generator for one entity kind.
///
/// Each entity family owns one sequence; ids are unique within that family
/// but not across families, matching the data model's "unique within their
/// kind" rule.
#[derive(Debug, Default)]
pub struct IdSequence(AtomicU64);

impl IdSequence {
    /// Creates a fresh sequence starting at 1.
    pub const fn new() -> Self {
        IdSequence(AtomicU64::new(0))
    }

    /// Returns the next id in the sequence.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}
