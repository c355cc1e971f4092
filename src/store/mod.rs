//! Persistence traits and the default in-memory implementation.
//!
//! The engine modules in [`crate::engine`] are written against the `*Store`
//! traits below rather than against `MemoryStore` directly, so a caller
//! embedding this crate could swap in a database-backed store without
//! touching pricing, commitment, or credit logic. [`BillingService`] wires
//! up [`memory::MemoryStore`] by default, as this crate ships no
//! database-backed implementation of its own.
//!
//! [`BillingService`]: crate::service::BillingService

pub mod memory;

use crate::error::Result;
use crate::ids::{
    BillingPeriodId, CommitmentTierId, CreditBalanceId, CreditTransactionId, CustomerId,
    InvoiceId, MetricId, PlanId, SubscriptionId, UsageEventId,
};
use crate::model::{
    BillingPeriod, CommitmentTier, CreditBalance, CreditTransaction, Customer, Invoice, Metric,
    MetricRef, Plan, Subscription, UsageEvent,
};

/// Storage for [`Customer`] records.
pub trait CustomerStore {
    async fn insert_customer(&self, customer: Customer) -> Result<Customer>;
    async fn get_customer(&self, id: CustomerId) -> Result<Customer>;
    async fn list_customers(&self) -> Result<Vec<Customer>>;
}

/// Storage for [`Metric`] records, addressable by id or by name.
pub trait MetricStore {
    async fn insert_metric(&self, metric: Metric) -> Result<Metric>;
    async fn update_metric(&self, metric: Metric) -> Result<Metric>;
    async fn delete_metric(&self, id: MetricId) -> Result<()>;
    async fn get_metric(&self, reference: &MetricRef) -> Result<Metric>;
    async fn list_metrics(&self) -> Result<Vec<Metric>>;
}

/// Storage for [`Plan`] records, each owning its embedded price components.
pub trait PlanStore {
    async fn insert_plan(&self, plan: Plan) -> Result<Plan>;
    async fn update_plan(&self, plan: Plan) -> Result<Plan>;
    async fn get_plan(&self, id: PlanId) -> Result<Plan>;
    async fn list_plans(&self) -> Result<Vec<Plan>>;
}

/// Storage for [`Subscription`] records.
pub trait SubscriptionStore {
    async fn insert_subscription(&self, subscription: Subscription) -> Result<Subscription>;
    async fn update_subscription(&self, subscription: Subscription) -> Result<Subscription>;
    async fn get_subscription(&self, id: SubscriptionId) -> Result<Subscription>;
    async fn list_subscriptions_for_customer(&self, customer_id: CustomerId)
        -> Result<Vec<Subscription>>;
    async fn list_active_subscriptions(&self, at: time::OffsetDateTime) -> Result<Vec<Subscription>>;
}

/// Storage for generated [`BillingPeriod`] windows.
pub trait BillingPeriodStore {
    async fn insert_billing_periods(&self, periods: Vec<BillingPeriod>) -> Result<Vec<BillingPeriod>>;
    async fn update_billing_period(&self, period: BillingPeriod) -> Result<BillingPeriod>;
    async fn get_billing_period(&self, id: BillingPeriodId) -> Result<BillingPeriod>;
    async fn list_billing_periods_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<BillingPeriod>>;
}

/// Storage for immutable [`UsageEvent`] records.
pub trait EventStore {
    async fn insert_event(&self, event: UsageEvent) -> Result<UsageEvent>;
    async fn list_events_for_customer_in_range(
        &self,
        customer_id: CustomerId,
        start: time::OffsetDateTime,
        end: time::OffsetDateTime,
    ) -> Result<Vec<UsageEvent>>;
    async fn list_events_for_billing_period(
        &self,
        billing_period_id: BillingPeriodId,
    ) -> Result<Vec<UsageEvent>>;
}

/// Storage for [`Invoice`] records, each owning its embedded line items.
pub trait InvoiceStore {
    async fn insert_invoice(&self, invoice: Invoice) -> Result<Invoice>;
    async fn update_invoice(&self, invoice: Invoice) -> Result<Invoice>;
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice>;
    async fn list_invoices_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Invoice>>;
    /// Whether an invoice with this number has already been persisted, used
    /// to retry invoice-number generation on collision.
    async fn invoice_number_exists(&self, number: &str) -> Result<bool>;
}

/// Storage for [`CommitmentTier`] records.
pub trait CommitmentStore {
    async fn insert_commitment(&self, commitment: CommitmentTier) -> Result<CommitmentTier>;
    async fn list_commitments_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<CommitmentTier>>;
}

/// Storage for [`CreditBalance`] records and their [`CreditTransaction`] log.
pub trait CreditStore {
    async fn insert_credit_balance(&self, balance: CreditBalance) -> Result<CreditBalance>;
    async fn update_credit_balance(&self, balance: CreditBalance) -> Result<CreditBalance>;
    async fn get_credit_balance(&self, id: CreditBalanceId) -> Result<CreditBalance>;
    async fn list_credit_balances_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<CreditBalance>>;
    /// Lists every credit balance across all customers, used by the
    /// periodic expiration sweep.
    async fn list_all_credit_balances(&self) -> Result<Vec<CreditBalance>>;
    async fn insert_credit_transaction(
        &self,
        transaction: CreditTransaction,
    ) -> Result<CreditTransaction>;

    /// Acquires the per-customer lock guarding credit-balance mutation for
    /// the duration of invoice generation, modeling row-level locking
    /// without a real database underneath.
    async fn lock_customer_credits(&self, customer_id: CustomerId) -> CreditLockGuard;
}

/// A guard held for the duration of one invoice generation, serializing
/// concurrent draws against the same customer's credit balances.
pub struct CreditLockGuard {
    _permit: tokio::sync::OwnedMutexGuard<()>,
}

impl CreditLockGuard {
    pub(crate) fn new(permit: tokio::sync::OwnedMutexGuard<()>) -> Self {
        CreditLockGuard { _permit: permit }
    }
}

/// The full storage surface required to run [`BillingService`].
///
/// [`BillingService`]: crate::service::BillingService
pub trait Store:
    CustomerStore
    + MetricStore
    + PlanStore
    + SubscriptionStore
    + BillingPeriodStore
    + EventStore
    + InvoiceStore
    + CommitmentStore
    + CreditStore
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: CustomerStore
        + MetricStore
        + PlanStore
        + SubscriptionStore
        + BillingPeriodStore
        + EventStore
        + InvoiceStore
        + CommitmentStore
        + CreditStore
        + Send
        + Sync
{
}
