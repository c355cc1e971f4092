//! The default in-memory [`Store`] implementation.
//!
//! Every entity family lives in its own `RwLock<HashMap<Id, T>>`; there is
//! no shared lock across families; so reads against, say, customers never
//! block writes to invoices. Row-level credit-balance locking is modeled
//! with one `tokio::sync::Mutex<()>` per customer, created lazily and kept
//! for the life of the store.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};

use crate::error::{BillingError, Result};
use crate::ids::{
    BillingPeriodId, CommitmentTierId, CreditBalanceId, CreditTransactionId, CustomerId, InvoiceId,
    MetricId, PlanId, SubscriptionId, UsageEventId,
};
use crate::model::{
    BillingPeriod, CommitmentTier, CreditBalance, CreditTransaction, Customer, Invoice, Metric,
    MetricRef, Plan, Subscription, UsageEvent,
};

use super::{
    BillingPeriodStore, CommitmentStore, CreditLockGuard, CreditStore, CustomerStore, EventStore,
    InvoiceStore, MetricStore, PlanStore, SubscriptionStore,
};

/// An in-memory, process-local implementation of every storage trait this
/// crate defines. Data does not survive past the process; there is no
/// on-disk representation.
#[derive(Default)]
pub struct MemoryStore {
    customers: RwLock<HashMap<CustomerId, Customer>>,
    metrics: RwLock<HashMap<MetricId, Metric>>,
    plans: RwLock<HashMap<PlanId, Plan>>,
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    billing_periods: RwLock<HashMap<BillingPeriodId, BillingPeriod>>,
    events: RwLock<HashMap<UsageEventId, UsageEvent>>,
    invoices: RwLock<HashMap<InvoiceId, Invoice>>,
    commitments: RwLock<HashMap<CommitmentTierId, CommitmentTier>>,
    credit_balances: RwLock<HashMap<CreditBalanceId, CreditBalance>>,
    credit_transactions: RwLock<HashMap<CreditTransactionId, CreditTransaction>>,
    credit_locks: RwLock<HashMap<CustomerId, Arc<Mutex<()>>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl CustomerStore for MemoryStore {
    async fn insert_customer(&self, customer: Customer) -> Result<Customer> {
        let mut customers = self.customers.write().await;
        if customers.values().any(|c| c.email == customer.email) {
            return Err(BillingError::conflict(
                "customer",
                format!("email '{}' already registered", customer.email),
            ));
        }
        customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Customer> {
        self.customers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| BillingError::not_found("customer", id.to_string()))
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        Ok(self.customers.read().await.values().cloned().collect())
    }
}

impl MetricStore for MemoryStore {
    async fn insert_metric(&self, metric: Metric) -> Result<Metric> {
        let mut metrics = self.metrics.write().await;
        if metrics.values().any(|m| m.name == metric.name) {
            return Err(BillingError::conflict(
                "metric",
                format!("name '{}' already registered", metric.name),
            ));
        }
        metrics.insert(metric.id, metric.clone());
        Ok(metric)
    }

    async fn update_metric(&self, metric: Metric) -> Result<Metric> {
        let mut metrics = self.metrics.write().await;
        if !metrics.contains_key(&metric.id) {
            return Err(BillingError::not_found("metric", metric.id.to_string()));
        }
        metrics.insert(metric.id, metric.clone());
        Ok(metric)
    }

    async fn delete_metric(&self, id: MetricId) -> Result<()> {
        let mut metrics = self.metrics.write().await;
        metrics
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| BillingError::not_found("metric", id.to_string()))
    }

    async fn get_metric(&self, reference: &MetricRef) -> Result<Metric> {
        let metrics = self.metrics.read().await;
        let found = match reference {
            MetricRef::Id(id) => metrics.get(id).cloned(),
            MetricRef::Name(name) => metrics.values().find(|m| &m.name == name).cloned(),
        };
        found.ok_or_else(|| BillingError::not_found("metric", reference.to_string()))
    }

    async fn list_metrics(&self) -> Result<Vec<Metric>> {
        Ok(self.metrics.read().await.values().cloned().collect())
    }
}

impl PlanStore for MemoryStore {
    async fn insert_plan(&self, plan: Plan) -> Result<Plan> {
        let mut plans = self.plans.write().await;
        plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn update_plan(&self, plan: Plan) -> Result<Plan> {
        let mut plans = self.plans.write().await;
        if !plans.contains_key(&plan.id) {
            return Err(BillingError::not_found("plan", plan.id.to_string()));
        }
        plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn get_plan(&self, id: PlanId) -> Result<Plan> {
        self.plans
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| BillingError::not_found("plan", id.to_string()))
    }

    async fn list_plans(&self) -> Result<Vec<Plan>> {
        Ok(self.plans.read().await.values().cloned().collect())
    }
}

impl SubscriptionStore for MemoryStore {
    async fn insert_subscription(&self, subscription: Subscription) -> Result<Subscription> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn update_subscription(&self, subscription: Subscription) -> Result<Subscription> {
        let mut subscriptions = self.subscriptions.write().await;
        if !subscriptions.contains_key(&subscription.id) {
            return Err(BillingError::not_found(
                "subscription",
                subscription.id.to_string(),
            ));
        }
        subscriptions.insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn get_subscription(&self, id: SubscriptionId) -> Result<Subscription> {
        self.subscriptions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| BillingError::not_found("subscription", id.to_string()))
    }

    async fn list_subscriptions_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn list_active_subscriptions(&self, at: OffsetDateTime) -> Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.active && s.covers(at))
            .cloned()
            .collect())
    }
}

impl BillingPeriodStore for MemoryStore {
    async fn insert_billing_periods(
        &self,
        periods: Vec<BillingPeriod>,
    ) -> Result<Vec<BillingPeriod>> {
        let mut store = self.billing_periods.write().await;
        for period in &periods {
            store.insert(period.id, period.clone());
        }
        Ok(periods)
    }

    async fn update_billing_period(&self, period: BillingPeriod) -> Result<BillingPeriod> {
        let mut store = self.billing_periods.write().await;
        if !store.contains_key(&period.id) {
            return Err(BillingError::not_found("billing_period", period.id.to_string()));
        }
        store.insert(period.id, period.clone());
        Ok(period)
    }

    async fn get_billing_period(&self, id: BillingPeriodId) -> Result<BillingPeriod> {
        self.billing_periods
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| BillingError::not_found("billing_period", id.to_string()))
    }

    async fn list_billing_periods_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<BillingPeriod>> {
        let mut periods: Vec<BillingPeriod> = self
            .billing_periods
            .read()
            .await
            .values()
            .filter(|p| p.subscription_id == subscription_id)
            .cloned()
            .collect();
        periods.sort_by_key(|p| p.start);
        Ok(periods)
    }
}

impl EventStore for MemoryStore {
    async fn insert_event(&self, event: UsageEvent) -> Result<UsageEvent> {
        let mut events = self.events.write().await;
        events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn list_events_for_customer_in_range(
        &self,
        customer_id: CustomerId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<UsageEvent>> {
        Ok(self
            .events
            .read()
            .await
            .values()
            .filter(|e| e.customer_id == customer_id && e.event_time >= start && e.event_time <= end)
            .cloned()
            .collect())
    }

    async fn list_events_for_billing_period(
        &self,
        billing_period_id: BillingPeriodId,
    ) -> Result<Vec<UsageEvent>> {
        Ok(self
            .events
            .read()
            .await
            .values()
            .filter(|e| e.billing_period_id == Some(billing_period_id))
            .cloned()
            .collect())
    }
}

impl InvoiceStore for MemoryStore {
    async fn insert_invoice(&self, invoice: Invoice) -> Result<Invoice> {
        let mut invoices = self.invoices.write().await;
        invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn update_invoice(&self, invoice: Invoice) -> Result<Invoice> {
        let mut invoices = self.invoices.write().await;
        if !invoices.contains_key(&invoice.id) {
            return Err(BillingError::not_found("invoice", invoice.id.to_string()));
        }
        invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice> {
        self.invoices
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| BillingError::not_found("invoice", id.to_string()))
    }

    async fn list_invoices_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Invoice>> {
        Ok(self
            .invoices
            .read()
            .await
            .values()
            .filter(|i| i.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn invoice_number_exists(&self, number: &str) -> Result<bool> {
        Ok(self.invoices.read().await.values().any(|i| i.number == number))
    }
}

impl CommitmentStore for MemoryStore {
    async fn insert_commitment(&self, commitment: CommitmentTier) -> Result<CommitmentTier> {
        let mut commitments = self.commitments.write().await;
        commitments.insert(commitment.id, commitment.clone());
        Ok(commitment)
    }

    async fn list_commitments_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<CommitmentTier>> {
        Ok(self
            .commitments
            .read()
            .await
            .values()
            .filter(|c| c.subscription_id == subscription_id)
            .cloned()
            .collect())
    }
}

impl CreditStore for MemoryStore {
    async fn insert_credit_balance(&self, balance: CreditBalance) -> Result<CreditBalance> {
        let mut balances = self.credit_balances.write().await;
        balances.insert(balance.id, balance.clone());
        Ok(balance)
    }

    async fn update_credit_balance(&self, balance: CreditBalance) -> Result<CreditBalance> {
        let mut balances = self.credit_balances.write().await;
        if !balances.contains_key(&balance.id) {
            return Err(BillingError::not_found("credit_balance", balance.id.to_string()));
        }
        balances.insert(balance.id, balance.clone());
        Ok(balance)
    }

    async fn get_credit_balance(&self, id: CreditBalanceId) -> Result<CreditBalance> {
        self.credit_balances
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| BillingError::not_found("credit_balance", id.to_string()))
    }

    async fn list_credit_balances_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<CreditBalance>> {
        Ok(self
            .credit_balances
            .read()
            .await
            .values()
            .filter(|b| b.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn list_all_credit_balances(&self) -> Result<Vec<CreditBalance>> {
        Ok(self.credit_balances.read().await.values().cloned().collect())
    }

    async fn insert_credit_transaction(
        &self,
        transaction: CreditTransaction,
    ) -> Result<CreditTransaction> {
        let mut transactions = self.credit_transactions.write().await;
        transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn lock_customer_credits(&self, customer_id: CustomerId) -> CreditLockGuard {
        let mutex = {
            let mut locks = self.credit_locks.write().await;
            locks
                .entry(customer_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        CreditLockGuard::new(mutex.lock_owned().await)
    }
}
