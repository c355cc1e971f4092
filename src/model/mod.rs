//! The persistence-agnostic data model described by the system's entities.
//!
//! Ownership between entities (customer -> subscription -> invoice ->
//! billing period, and back) is expressed only through the id fields below;
//! there is no bidirectional in-memory object graph. Callers hold owned
//! values returned by a [`crate::store::Store`] and re-fetch related
//! entities by id rather than following a Rust reference.

mod billing_period;
mod commitment;
mod credit;
mod customer;
mod invoice;
mod metric;
mod plan;
mod subscription;
mod usage_event;

pub use billing_period::BillingPeriod;
pub use commitment::CommitmentTier;
pub use credit::{CreditBalance, CreditStatus, CreditTransaction, CreditType};
pub use customer::Customer;
pub use invoice::{Invoice, InvoiceItem, InvoiceStatus};
pub use metric::{AggregationType, Formula, Metric, MetricKind, MetricRef};
pub use plan::{
    BillingFrequency, DimensionRate, Plan, PriceComponent, PricingDetails, PricingType, ThresholdFee,
    Tier, VolumeTier,
};
pub use subscription::Subscription;
pub use usage_event::UsageEvent;
