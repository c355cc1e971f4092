//! [`BillingService`]: the single embedding entrypoint, wiring the engine
//! modules in [`crate::engine`] to a concrete [`Store`] and owning the id
//! sequences and configuration every operation needs.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::instrument;

use crate::config::EngineConfig;
use crate::engine::{
    billing_periods, commitments::CommitmentOverrides, credits, events, invoices, metrics, plans,
    pricing, subscriptions, usage,
};
use crate::error::Result;
use crate::ids::{
    BillingPeriodId, CommitmentTierId, CreditBalanceId, CustomerId, IdSequence, InvoiceId,
    InvoiceItemId, MetricId, PlanId, PriceComponentId, SubscriptionId,
};
use crate::model::{
    AggregationType, BillingPeriod, CommitmentTier, CreditBalance, CreditType, Customer, Formula,
    Invoice, InvoiceItem, InvoiceStatus, Metric, MetricKind, MetricRef, Plan, PriceComponent,
    PricingDetails, Subscription, UsageEvent,
};
use crate::store::memory::MemoryStore;
use crate::store::Store;

/// The owned id sequences for every entity family, one per kind as required
/// by the data model's "unique within their kind" rule.
#[derive(Debug, Default)]
struct Sequences {
    customer: IdSequence,
    metric: IdSequence,
    plan: IdSequence,
    price_component: IdSequence,
    subscription: IdSequence,
    billing_period: IdSequence,
    usage_event: IdSequence,
    invoice: IdSequence,
    invoice_item: IdSequence,
    commitment_tier: IdSequence,
    credit_balance: IdSequence,
    credit_transaction: IdSequence,
}

/// A usage-based billing service backed by an in-memory [`Store`].
///
/// This is the crate's single public entrypoint. It does not expose an HTTP
/// surface of its own; an application embedding this crate is expected to
/// translate its own request/response types to and from the methods below.
#[derive(Debug)]
pub struct BillingService<S = MemoryStore> {
    store: S,
    config: EngineConfig,
    sequences: Sequences,
}

impl BillingService<MemoryStore> {
    /// Creates a service backed by the default in-memory store.
    pub fn new(config: EngineConfig) -> Self {
        BillingService {
            store: MemoryStore::new(),
            config,
            sequences: Sequences::default(),
        }
    }
}

impl<S: Store> BillingService<S> {
    /// Creates a service backed by a caller-supplied store implementation.
    pub fn with_store(store: S, config: EngineConfig) -> Self {
        BillingService {
            store,
            config,
            sequences: Sequences::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -- Customers --------------------------------------------------------

    pub async fn create_customer(
        &self,
        email: String,
        name: String,
        now: OffsetDateTime,
    ) -> Result<Customer> {
        let customer = Customer::new(
            CustomerId::from(self.sequences.customer.next()),
            email,
            name,
            now,
        );
        self.store.insert_customer(customer).await
    }

    pub async fn get_customer(&self, id: CustomerId) -> Result<Customer> {
        self.store.get_customer(id).await
    }

    pub async fn list_customers(&self) -> Result<Vec<Customer>> {
        self.store.list_customers().await
    }

    // -- Metrics ------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_metric(
        &self,
        name: String,
        display_name: String,
        unit: String,
        kind: MetricKind,
        aggregation: AggregationType,
        formula: Option<Formula>,
        display_properties: HashMap<String, String>,
    ) -> Result<Metric> {
        metrics::create_metric(
            &self.store,
            &self.sequences.metric,
            name,
            display_name,
            unit,
            kind,
            aggregation,
            formula,
            display_properties,
        )
        .await
    }

    pub async fn update_metric(&self, metric: Metric) -> Result<Metric> {
        metrics::update_metric(&self.store, metric).await
    }

    pub async fn delete_metric(&self, id: MetricId) -> Result<()> {
        metrics::delete_metric(&self.store, id).await
    }

    pub async fn get_metric(&self, reference: impl Into<MetricRef>) -> Result<Metric> {
        metrics::get_metric(&self.store, reference).await
    }

    pub async fn list_metrics(&self) -> Result<Vec<Metric>> {
        metrics::list_metrics(&self.store).await
    }

    // -- Plans --------------------------------------------------------------

    pub async fn create_plan(
        &self,
        name: String,
        description: String,
        billing_frequency: &str,
        components: Vec<plans::NewPriceComponent>,
    ) -> Result<Plan> {
        plans::create_plan(
            &self.store,
            &self.sequences.plan,
            &self.sequences.price_component,
            name,
            description,
            billing_frequency,
            components,
        )
        .await
    }

    pub async fn add_price_component(
        &self,
        plan_id: PlanId,
        spec: plans::NewPriceComponent,
    ) -> Result<Plan> {
        plans::add_component(&self.store, &self.sequences.price_component, plan_id, spec).await
    }

    pub async fn remove_price_component(
        &self,
        plan_id: PlanId,
        component_id: PriceComponentId,
    ) -> Result<Plan> {
        plans::remove_component(&self.store, plan_id, component_id).await
    }

    pub async fn deactivate_plan(&self, plan_id: PlanId) -> Result<Plan> {
        plans::deactivate_plan(&self.store, plan_id).await
    }

    pub async fn update_plan(&self, plan: Plan) -> Result<Plan> {
        plans::update_plan(&self.store, plan).await
    }

    pub async fn get_plan(&self, plan_id: PlanId) -> Result<Plan> {
        plans::get_plan(&self.store, plan_id).await
    }

    pub async fn list_plans(&self, active_only: bool) -> Result<Vec<Plan>> {
        plans::list_plans(&self.store, active_only).await
    }

    // -- Subscriptions --------------------------------------------------------

    pub async fn create_subscription(
        &self,
        now: OffsetDateTime,
        customer_id: CustomerId,
        plan_id: PlanId,
        start: Option<OffsetDateTime>,
        end: Option<OffsetDateTime>,
    ) -> Result<Subscription> {
        subscriptions::create(
            &self.store,
            &self.sequences.subscription,
            &self.sequences.billing_period,
            now,
            customer_id,
            plan_id,
            start,
            end,
        )
        .await
    }

    pub async fn cancel_subscription(
        &self,
        id: SubscriptionId,
        end: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Result<Subscription> {
        subscriptions::cancel(&self.store, id, end, now).await
    }

    pub async fn get_subscription(&self, id: SubscriptionId) -> Result<Subscription> {
        subscriptions::get(&self.store, id).await
    }

    pub async fn list_subscriptions_for_customer(
        &self,
        customer_id: CustomerId,
        active_only: bool,
    ) -> Result<Vec<Subscription>> {
        subscriptions::list_for_customer(&self.store, customer_id, active_only).await
    }

    pub async fn list_billing_periods_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<BillingPeriod>> {
        self.store
            .list_billing_periods_for_subscription(subscription_id)
            .await
    }

    /// Regenerates the billing period schedule for a subscription, e.g. after
    /// its plan's billing frequency changed. Existing periods are left in
    /// place; only new ones from `now` onward are added.
    pub async fn refresh_billing_periods(
        &self,
        subscription_id: SubscriptionId,
        now: OffsetDateTime,
    ) -> Result<Vec<BillingPeriod>> {
        let subscription = self.store.get_subscription(subscription_id).await?;
        let plan = self.store.get_plan(subscription.plan_id).await?;
        let periods = billing_periods::generate_periods(
            &subscription,
            plan.billing_frequency,
            now,
            &self.sequences.billing_period,
        );
        self.store.insert_billing_periods(periods).await
    }

    // -- Commitments --------------------------------------------------------

    pub async fn create_commitment(
        &self,
        subscription_id: SubscriptionId,
        metric_id: MetricId,
        committed_amount: Decimal,
        rate: Decimal,
        overage_rate: Option<Decimal>,
        start: OffsetDateTime,
        end: Option<OffsetDateTime>,
    ) -> Result<CommitmentTier> {
        let commitment = CommitmentTier {
            id: CommitmentTierId::from(self.sequences.commitment_tier.next()),
            subscription_id,
            metric_id,
            committed_amount,
            rate,
            overage_rate,
            start,
            end,
        };
        self.store.insert_commitment(commitment).await
    }

    pub async fn list_commitments_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<CommitmentTier>> {
        self.store
            .list_commitments_for_subscription(subscription_id)
            .await
    }

    /// Previews which commitments would override their metric's usage-based
    /// charge over `[start, end]`, without assembling an invoice.
    pub async fn preview_commitment_overrides(
        &self,
        subscription_id: SubscriptionId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<CommitmentOverrides> {
        let subscription = self.store.get_subscription(subscription_id).await?;
        let commitments = self
            .store
            .list_commitments_for_subscription(subscription_id)
            .await?;
        let usage_summary = usage::aggregate(&self.store, subscription.customer_id, start, end).await?;

        let mut usage_by_metric_id = HashMap::new();
        for commitment in &commitments {
            if let Ok(metric) = self.store.get_metric(&MetricRef::Id(commitment.metric_id)).await {
                usage_by_metric_id.insert(commitment.metric_id, usage_summary.quantity_for(&metric.name));
            }
        }
        Ok(crate::engine::commitments::evaluate_commitments(
            &commitments,
            start,
            end,
            &usage_by_metric_id,
        ))
    }

    // -- Usage events ---------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn track_usage(&self, event: events::NewUsageEvent, now: OffsetDateTime) -> Result<UsageEvent> {
        events::track(&self.store, &self.sequences.usage_event, now, event).await
    }

    pub async fn batch_track_usage(
        &self,
        events: Vec<events::NewUsageEvent>,
        now: OffsetDateTime,
    ) -> Vec<Result<UsageEvent>> {
        events::batch_track(&self.store, &self.sequences.usage_event, now, events).await
    }

    pub async fn aggregate_usage(
        &self,
        customer_id: CustomerId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<usage::UsageSummary> {
        usage::aggregate(&self.store, customer_id, start, end).await
    }

    /// Evaluates a price component's charge for a hypothetical quantity,
    /// without any usage lookup. Useful for pricing previews in a UI.
    pub fn preview_pricing(
        &self,
        component: &PriceComponent,
        quantity: Decimal,
        dimension_inputs: &HashMap<String, Decimal>,
    ) -> pricing::PricingResult {
        pricing::evaluate(component, quantity, dimension_inputs)
    }

    // -- Invoices -------------------------------------------------------------

    pub async fn generate_invoice(
        &self,
        now: OffsetDateTime,
        customer_id: CustomerId,
        start: OffsetDateTime,
        end: OffsetDateTime,
        subscription_id: Option<SubscriptionId>,
    ) -> Result<Invoice> {
        let sequences = self.invoice_sequences();
        invoices::generate(
            &self.store,
            &sequences,
            now,
            self.config.default_payment_term_days,
            customer_id,
            start,
            end,
            subscription_id,
        )
        .await
    }

    pub async fn generate_invoice_for_billing_period(
        &self,
        now: OffsetDateTime,
        billing_period_id: BillingPeriodId,
    ) -> Result<Invoice> {
        let sequences = self.invoice_sequences();
        invoices::generate_for_billing_period(
            &self.store,
            &sequences,
            now,
            self.config.default_payment_term_days,
            billing_period_id,
        )
        .await
    }

    pub async fn generate_invoices_for_period(
        &self,
        now: OffsetDateTime,
        start: OffsetDateTime,
        end: OffsetDateTime,
        customer_id: Option<CustomerId>,
    ) -> Result<Vec<Invoice>> {
        let sequences = self.invoice_sequences();
        invoices::generate_invoices_for_period(
            &self.store,
            &sequences,
            now,
            self.config.default_payment_term_days,
            start,
            end,
            customer_id,
        )
        .await
    }

    pub async fn finalize_invoice(&self, id: InvoiceId) -> Result<Invoice> {
        invoices::finalize(&self.store, id).await
    }

    pub async fn void_invoice(&self, id: InvoiceId, reason: &str) -> Result<Invoice> {
        invoices::void(&self.store, id, reason).await
    }

    pub async fn update_invoice_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<Invoice> {
        invoices::update_status(&self.store, id, status).await
    }

    pub async fn add_invoice_item(&self, invoice_id: InvoiceId, item: InvoiceItem) -> Result<Invoice> {
        invoices::add_item(&self.store, &self.sequences.invoice_item, invoice_id, item).await
    }

    pub async fn remove_invoice_item(&self, invoice_id: InvoiceId, item_id: InvoiceItemId) -> Result<Invoice> {
        invoices::remove_item(&self.store, invoice_id, item_id).await
    }

    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice> {
        self.store.get_invoice(id).await
    }

    pub async fn list_invoices_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Invoice>> {
        self.store.list_invoices_for_customer(customer_id).await
    }

    fn invoice_sequences(&self) -> invoices::InvoiceSequences<'_> {
        invoices::InvoiceSequences {
            invoice: &self.sequences.invoice,
            item: &self.sequences.invoice_item,
            credit_transaction: &self.sequences.credit_transaction,
        }
    }

    // -- Credits --------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn add_credits(
        &self,
        customer_id: CustomerId,
        amount: Decimal,
        credit_type: CreditType,
        description: String,
        expires_at: Option<OffsetDateTime>,
        subscription_id: Option<SubscriptionId>,
        invoice_id: Option<InvoiceId>,
        now: OffsetDateTime,
    ) -> Result<CreditBalance> {
        credits::add_credits(
            &self.store,
            &self.sequences.credit_balance,
            &self.sequences.credit_transaction,
            customer_id,
            amount,
            credit_type,
            description,
            expires_at,
            subscription_id,
            invoice_id,
            now,
        )
        .await
    }

    pub async fn available_credit_balance(&self, customer_id: CustomerId, now: OffsetDateTime) -> Result<Decimal> {
        credits::available_balance(&self.store, customer_id, now).await
    }

    pub async fn apply_credits_manually(
        &self,
        customer_id: CustomerId,
        requested: Decimal,
        now: OffsetDateTime,
    ) -> Result<Vec<credits::AppliedCredit>> {
        let _lock = self.store.lock_customer_credits(customer_id).await;
        credits::apply_manual(&self.store, &self.sequences.credit_transaction, customer_id, requested, now).await
    }

    pub async fn list_credit_balances_for_customer(&self, customer_id: CustomerId) -> Result<Vec<CreditBalance>> {
        self.store.list_credit_balances_for_customer(customer_id).await
    }

    /// Expires every active, past-due credit balance; intended to be called
    /// periodically by a caller-owned scheduler.
    pub async fn sweep_expired_credits(&self, now: OffsetDateTime) -> Result<usize> {
        credits::sweep_expired(&self.store, &self.sequences.credit_transaction, now).await
    }

    // -- Formula preview ------------------------------------------------------

    /// Evaluates a composite metric's formula against raw source-metric
    /// inputs, without persisting anything. Useful for validating a formula
    /// before saving it on a metric.
    pub fn preview_formula(
        &self,
        formula: &Formula,
        inputs: &HashMap<String, Decimal>,
    ) -> Result<Decimal> {
        let metric = Metric {
            id: MetricId(0),
            name: String::new(),
            display_name: String::new(),
            unit: String::new(),
            kind: MetricKind::Composite,
            aggregation: AggregationType::Sum,
            formula: Some(formula.clone()),
            display_properties: HashMap::new(),
        };
        metrics::evaluate_composite(&metric, inputs)
    }
}
