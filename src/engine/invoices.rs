//! The invoice assembler: orchestrates usage aggregation, pricing
//! evaluation, commitment overrides, and credit application inside one
//! logical transaction, plus the invoice lifecycle operations.

use std::collections::HashMap;

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::error::{BillingError, Result};
use crate::ids::{BillingPeriodId, CustomerId, IdSequence, InvoiceId, InvoiceItemId, SubscriptionId};
use crate::model::{Invoice, InvoiceItem, InvoiceStatus, MetricRef, Plan, PricingType, Subscription};
use crate::store::Store;

use super::{commitments, pricing, usage};

/// The id sequences the invoice assembler owns, bundled so call sites don't
/// thread four separate `&IdSequence` parameters.
pub struct InvoiceSequences<'a> {
    pub invoice: &'a IdSequence,
    pub item: &'a IdSequence,
    pub credit_transaction: &'a IdSequence,
}

/// Generates an invoice for `customer_id` over `[start, end]`.
///
/// When `subscription_id` is given, flat/subscription fee components are
/// billed and commitment minimums are applied; price components are
/// evaluated only for that one subscription's plan. When omitted, every
/// subscription overlapping the range contributes its non-fixed-fee usage
/// charges and flat/subscription fees are never billed (an explicit
/// subscription is required for those, resolving the ambiguity in the
/// system this was distilled from).
#[instrument(skip(store, sequences), fields(customer_id = %customer_id, %start, %end))]
pub async fn generate<S: Store>(
    store: &S,
    sequences: &InvoiceSequences<'_>,
    now: OffsetDateTime,
    payment_term_days: i64,
    customer_id: CustomerId,
    start: OffsetDateTime,
    end: OffsetDateTime,
    subscription_id: Option<SubscriptionId>,
) -> Result<Invoice> {
    store.get_customer(customer_id).await?;

    let subscriptions = resolve_subscriptions(store, customer_id, start, end, subscription_id).await?;
    let usage_summary = usage::aggregate(store, customer_id, start, end).await?;

    let number = allocate_invoice_number(store, customer_id, start, now).await?;
    let mut invoice = Invoice {
        id: crate::ids::InvoiceId::from(sequences.invoice.next()),
        customer_id,
        number,
        status: InvoiceStatus::Draft,
        issue_date: now,
        due_date: now + time::Duration::days(payment_term_days),
        amount: Decimal::ZERO,
        paid_date: None,
        notes: String::new(),
        items: Vec::new(),
    };

    for subscription in &subscriptions {
        let plan = store.get_plan(subscription.plan_id).await?;
        let explicit = Some(subscription.id) == subscription_id;

        if explicit {
            bill_fixed_fees(&mut invoice, sequences.item, &plan, subscription.id);
        }

        let mut overrides = if explicit {
            let commitments = store.list_commitments_for_subscription(subscription.id).await?;
            let mut usage_by_metric_id = HashMap::new();
            for commitment in &commitments {
                if let Ok(metric) = store.get_metric(&MetricRef::Id(commitment.metric_id)).await {
                    usage_by_metric_id.insert(commitment.metric_id, usage_summary.quantity_for(&metric.name));
                }
            }
            commitments::evaluate_commitments(&commitments, start, end, &usage_by_metric_id)
        } else {
            Default::default()
        };

        bill_usage_components(
            &mut invoice,
            sequences.item,
            &plan,
            subscription.id,
            &usage_summary,
            &mut overrides,
        );

        for (metric_id, committed_charge) in overrides {
            let description = match store.get_metric(&MetricRef::Id(metric_id)).await {
                Ok(metric) => format!("Minimum commitment for {}", metric.display_name),
                Err(_) => "Minimum commitment".to_string(),
            };
            invoice.items.push(InvoiceItem {
                id: InvoiceItemId::from(sequences.item.next()),
                invoice_id: invoice.id,
                description,
                metric_name: None,
                quantity: Some(Decimal::ZERO),
                unit_price: Decimal::ZERO,
                amount: committed_charge,
                subscription_id: Some(subscription.id),
            });
        }
    }

    invoice.recompute_amount();

    let pre_credit_total = invoice.amount;
    let lock = store.lock_customer_credits(customer_id).await;
    let (post_credit_total, applied) = super::credits::apply_to_invoice(
        store,
        sequences.credit_transaction,
        customer_id,
        invoice.id,
        pre_credit_total,
        now,
    )
    .await?;
    drop(lock);

    for credit in applied {
        invoice.items.push(InvoiceItem {
            id: InvoiceItemId::from(sequences.item.next()),
            invoice_id: invoice.id,
            description: credit.description,
            metric_name: None,
            quantity: None,
            unit_price: -credit.amount,
            amount: -credit.amount,
            subscription_id: None,
        });
    }
    invoice.recompute_amount();
    debug_assert_eq!(invoice.amount, post_credit_total);

    store.insert_invoice(invoice).await
}

async fn resolve_subscriptions<S: Store>(
    store: &S,
    customer_id: CustomerId,
    start: OffsetDateTime,
    end: OffsetDateTime,
    subscription_id: Option<SubscriptionId>,
) -> Result<Vec<Subscription>> {
    if let Some(id) = subscription_id {
        return Ok(vec![store.get_subscription(id).await?]);
    }
    let all = store.list_subscriptions_for_customer(customer_id).await?;
    Ok(all.into_iter().filter(|s| s.overlaps(start, end)).collect())
}

fn bill_fixed_fees(invoice: &mut Invoice, item_sequence: &IdSequence, plan: &Plan, subscription_id: SubscriptionId) {
    for component in plan
        .components
        .iter()
        .filter(|c| c.pricing_details.pricing_type().is_fixed_fee())
    {
        let result = pricing::evaluate(component, Decimal::ONE, &HashMap::new());
        invoice.items.push(InvoiceItem {
            id: InvoiceItemId::from(item_sequence.next()),
            invoice_id: invoice.id,
            description: result.description,
            metric_name: Some(component.metric_name.clone()),
            quantity: Some(Decimal::ONE),
            unit_price: result.unit_price,
            amount: result.charge,
            subscription_id: Some(subscription_id),
        });
    }
}

fn bill_usage_components(
    invoice: &mut Invoice,
    item_sequence: &IdSequence,
    plan: &Plan,
    subscription_id: SubscriptionId,
    usage_summary: &usage::UsageSummary,
    overrides: &mut commitments::CommitmentOverrides,
) {
    for component in plan
        .components
        .iter()
        .filter(|c| c.pricing_details.pricing_type() != PricingType::Flat)
        .filter(|c| c.pricing_details.pricing_type() != PricingType::Subscription)
    {
        let quantity = usage_summary.quantity_for(&component.metric_name);
        let dimension_inputs = usage_summary.dimensions_for(&component.metric_name);
        let mut result = pricing::evaluate(component, quantity, &dimension_inputs);

        if let Some(metric_id) = component.metric_id {
            if let Some(committed_charge) = overrides.remove(&metric_id) {
                if committed_charge > result.charge {
                    result.charge = committed_charge;
                    result.unit_price = Decimal::ZERO;
                    result.description = format!("Minimum commitment for {}", component.display_name);
                }
            }
        }

        if result.charge > Decimal::ZERO || quantity > Decimal::ZERO {
            invoice.items.push(InvoiceItem {
                id: InvoiceItemId::from(item_sequence.next()),
                invoice_id: invoice.id,
                description: result.description,
                metric_name: Some(component.metric_name.clone()),
                quantity: Some(quantity),
                unit_price: result.unit_price,
                amount: result.charge,
                subscription_id: Some(subscription_id),
            });
        } else {
            warn!(component = %component.display_name, "zero charge and zero usage; omitted from invoice");
        }
    }
}

async fn allocate_invoice_number<S: Store>(
    store: &S,
    customer_id: CustomerId,
    start: OffsetDateTime,
    mut now: OffsetDateTime,
) -> Result<String> {
    loop {
        let number = format!(
            "INV-{}-{}-{:04}{:02}{:02}",
            format_timestamp(now),
            customer_id.0,
            start.year(),
            start.month() as u8,
            start.day(),
        );
        if !store.invoice_number_exists(&number).await? {
            return Ok(number);
        }
        now += time::Duration::seconds(1);
    }
}

fn format_timestamp(instant: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}",
        instant.year(),
        instant.month() as u8,
        instant.day(),
        instant.hour(),
        instant.minute(),
        instant.second(),
    )
}

/// Generates an invoice for one billing period, links it back to that
/// period, and replaces the invoice's notes with a period description.
pub async fn generate_for_billing_period<S: Store>(
    store: &S,
    sequences: &InvoiceSequences<'_>,
    now: OffsetDateTime,
    payment_term_days: i64,
    billing_period_id: BillingPeriodId,
) -> Result<Invoice> {
    let mut period = store.get_billing_period(billing_period_id).await?;
    let subscription = store.get_subscription(period.subscription_id).await?;

    let mut invoice = generate(
        store,
        sequences,
        now,
        payment_term_days,
        subscription.customer_id,
        period.start,
        period.end,
        Some(subscription.id),
    )
    .await?;

    invoice.notes = format!("Invoice for billing period {} to {}", period.start, period.end);
    let invoice = store.update_invoice(invoice).await?;

    period.invoice_id = Some(invoice.id);
    store.update_billing_period(period).await?;

    Ok(invoice)
}

/// Generates one invoice per customer with usage in `[start, end]`, or one
/// invoice for `customer_id` specifically when given. Never bills
/// subscription/flat fees, since no subscription context is implied by a
/// bare date range.
pub async fn generate_invoices_for_period<S: Store>(
    store: &S,
    sequences: &InvoiceSequences<'_>,
    now: OffsetDateTime,
    payment_term_days: i64,
    start: OffsetDateTime,
    end: OffsetDateTime,
    customer_id: Option<CustomerId>,
) -> Result<Vec<Invoice>> {
    let customers = match customer_id {
        Some(id) => vec![id],
        None => {
            let mut with_usage = Vec::new();
            for customer in store.list_customers().await? {
                let events = store
                    .list_events_for_customer_in_range(customer.id, start, end)
                    .await?;
                if !events.is_empty() {
                    with_usage.push(customer.id);
                }
            }
            with_usage
        }
    };

    let mut invoices = Vec::with_capacity(customers.len());
    for customer in customers {
        let invoice = generate(store, sequences, now, payment_term_days, customer, start, end, None).await?;
        invoices.push(invoice);
    }
    Ok(invoices)
}

/// Transitions a draft invoice to `pending`, freezing its items.
pub async fn finalize(store: &impl crate::store::InvoiceStore, id: InvoiceId) -> Result<Invoice> {
    let mut invoice = store.get_invoice(id).await?;
    if invoice.status != InvoiceStatus::Draft {
        return Err(BillingError::state_violation(
            "invoice",
            "only a draft invoice can be finalized",
        ));
    }
    invoice.status = InvoiceStatus::Pending;
    info!(invoice_id = %id, "invoice finalized");
    store.update_invoice(invoice).await
}

/// Voids any non-paid invoice, appending `reason` to its notes.
pub async fn void(store: &impl crate::store::InvoiceStore, id: InvoiceId, reason: &str) -> Result<Invoice> {
    let mut invoice = store.get_invoice(id).await?;
    if invoice.status == InvoiceStatus::Paid {
        return Err(BillingError::state_violation("invoice", "a paid invoice may never be voided"));
    }
    invoice.status = InvoiceStatus::Void;
    if !reason.is_empty() {
        invoice.notes = format!("{}\nVoided: {}", invoice.notes, reason).trim_start().to_string();
    }
    info!(invoice_id = %id, "invoice voided");
    store.update_invoice(invoice).await
}

pub async fn update_status(
    store: &impl crate::store::InvoiceStore,
    id: InvoiceId,
    status: InvoiceStatus,
) -> Result<Invoice> {
    let mut invoice = store.get_invoice(id).await?;
    if invoice.status == InvoiceStatus::Paid && status == InvoiceStatus::Void {
        return Err(BillingError::state_violation("invoice", "a paid invoice may never be voided"));
    }
    invoice.status = status;
    store.update_invoice(invoice).await
}

/// Adds a line item to a draft invoice, recomputing the running total.
pub async fn add_item(
    store: &impl crate::store::InvoiceStore,
    item_sequence: &IdSequence,
    invoice_id: InvoiceId,
    mut item: InvoiceItem,
) -> Result<Invoice> {
    let mut invoice = store.get_invoice(invoice_id).await?;
    if !invoice.status.is_mutable() {
        return Err(BillingError::state_violation("invoice", "items may only be added to a draft invoice"));
    }
    item.id = InvoiceItemId::from(item_sequence.next());
    item.invoice_id = invoice_id;
    invoice.items.push(item);
    invoice.recompute_amount();
    store.update_invoice(invoice).await
}

/// Removes a line item from a draft invoice by id, recomputing the running
/// total.
pub async fn remove_item(
    store: &impl crate::store::InvoiceStore,
    invoice_id: InvoiceId,
    item_id: InvoiceItemId,
) -> Result<Invoice> {
    let mut invoice = store.get_invoice(invoice_id).await?;
    if !invoice.status.is_mutable() {
        return Err(BillingError::state_violation("invoice", "items may only be removed from a draft invoice"));
    }
    let before = invoice.items.len();
    invoice.items.retain(|i| i.id != item_id);
    if invoice.items.len() == before {
        return Err(BillingError::not_found("invoice_item", item_id.to_string()));
    }
    invoice.recompute_amount();
    store.update_invoice(invoice).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CommitmentTierId, MetricId, PlanId, PriceComponentId};
    use crate::model::{
        AggregationType, Customer, Metric, MetricKind, Plan, PriceComponent, PricingDetails, Tier,
    };
    use crate::store::memory::MemoryStore;
    use crate::store::{
        BillingPeriodStore as _, CommitmentStore as _, CustomerStore as _, MetricStore as _,
        PlanStore as _, SubscriptionStore as _,
    };
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    struct Fixture {
        store: MemoryStore,
    }

    impl Fixture {
        fn sequences() -> (IdSequence, IdSequence, IdSequence) {
            (IdSequence::new(), IdSequence::new(), IdSequence::new())
        }
    }

    #[tokio::test]
    async fn range_generation_without_subscription_skips_fixed_fees() {
        let store = MemoryStore::new();
        let now = datetime!(2024-01-15 00:00:00 UTC);
        store
            .insert_customer(Customer::new(CustomerId(1), "a@example.com".into(), "A".into(), now))
            .await
            .unwrap();

        let (invoice_seq, item_seq, credit_seq) = Fixture::sequences();
        let sequences = InvoiceSequences {
            invoice: &invoice_seq,
            item: &item_seq,
            credit_transaction: &credit_seq,
        };

        let invoice = generate(
            &store,
            &sequences,
            now,
            30,
            CustomerId(1),
            datetime!(2024-01-01 00:00:00 UTC),
            datetime!(2024-02-01 00:00:00 UTC),
            None,
        )
        .await
        .unwrap();

        assert_eq!(invoice.amount, dec!(0));
        assert!(invoice.items.is_empty());
    }

    #[tokio::test]
    async fn commitment_overrides_low_usage_tiered_charge() {
        let store = MemoryStore::new();
        let now = datetime!(2024-01-15 00:00:00 UTC);
        store
            .insert_customer(Customer::new(CustomerId(1), "a@example.com".into(), "A".into(), now))
            .await
            .unwrap();
        store
            .insert_metric(Metric {
                id: MetricId(1),
                name: "api_calls".into(),
                display_name: "API Calls".into(),
                unit: "calls".into(),
                kind: MetricKind::Counter,
                aggregation: AggregationType::Sum,
                formula: None,
                display_properties: Default::default(),
            })
            .await
            .unwrap();

        let plan = Plan {
            id: PlanId(1),
            name: "Plan".into(),
            description: "".into(),
            billing_frequency: crate::model::BillingFrequency::Monthly,
            active: true,
            components: vec![PriceComponent {
                id: PriceComponentId(1),
                plan_id: PlanId(1),
                metric_name: "api_calls".into(),
                metric_id: Some(MetricId(1)),
                display_name: "API Calls".into(),
                pricing_details: PricingDetails::Tiered {
                    tiers: vec![Tier {
                        start: dec!(0),
                        end: None,
                        price: dec!(0.008),
                    }],
                },
            }],
        };
        store.insert_plan(plan).await.unwrap();

        let subscription = Subscription {
            id: SubscriptionId(1),
            customer_id: CustomerId(1),
            plan_id: PlanId(1),
            start: datetime!(2024-01-01 00:00:00 UTC),
            end: None,
            active: true,
        };
        store.insert_subscription(subscription.clone()).await.unwrap();

        store
            .insert_commitment(crate::model::CommitmentTier {
                id: CommitmentTierId(1),
                subscription_id: SubscriptionId(1),
                metric_id: MetricId(1),
                committed_amount: dec!(5000),
                rate: dec!(0.008),
                overage_rate: None,
                start: datetime!(2024-01-01 00:00:00 UTC),
                end: None,
            })
            .await
            .unwrap();

        let period_sequence = IdSequence::new();
        let periods = super::super::billing_periods::generate_periods(
            &subscription,
            crate::model::BillingFrequency::Monthly,
            now,
            &period_sequence,
        );
        store.insert_billing_periods(periods.clone()).await.unwrap();

        let event_sequence = IdSequence::new();
        super::super::events::track(
            &store,
            &event_sequence,
            now,
            super::super::events::NewUsageEvent {
                customer_id: CustomerId(1),
                metric_name: "api_calls".into(),
                metric_id: Some(MetricId(1)),
                quantity: dec!(3000),
                event_time: Some(now),
                properties: Default::default(),
            },
        )
        .await
        .unwrap();

        let (invoice_seq, item_seq, credit_seq) = Fixture::sequences();
        let sequences = InvoiceSequences {
            invoice: &invoice_seq,
            item: &item_seq,
            credit_transaction: &credit_seq,
        };

        let invoice = generate(
            &store,
            &sequences,
            now,
            30,
            CustomerId(1),
            periods[0].start,
            periods[0].end,
            Some(SubscriptionId(1)),
        )
        .await
        .unwrap();

        let item = invoice
            .items
            .iter()
            .find(|i| i.metric_name.as_deref() == Some("api_calls"))
            .unwrap();
        assert_eq!(item.amount, dec!(40));
        assert_eq!(item.description, "Minimum commitment for API Calls");
    }
}
