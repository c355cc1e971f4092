//! The event ingestor: accepts usage events and attaches each to its
//! billing period.

use std::collections::HashMap;

use serde_json::Value;
use time::OffsetDateTime;
use tracing::warn;

use crate::error::{BillingError, Result};
use crate::ids::{CustomerId, IdSequence, MetricId, UsageEventId};
use crate::model::UsageEvent;
use crate::store::{BillingPeriodStore, CustomerStore, EventStore, SubscriptionStore};

use super::billing_periods::find_period_for;

/// The caller-supplied shape of a new usage event, before an id or billing
/// period attachment is resolved.
pub struct NewUsageEvent {
    pub customer_id: CustomerId,
    pub metric_name: String,
    pub metric_id: Option<MetricId>,
    pub quantity: rust_decimal::Decimal,
    pub event_time: Option<OffsetDateTime>,
    pub properties: HashMap<String, Value>,
}

/// Records one usage event, attaching it to the billing period of the first
/// matching active subscription, if any.
pub async fn track<S>(store: &S, sequence: &IdSequence, now: OffsetDateTime, event: NewUsageEvent) -> Result<UsageEvent>
where
    S: CustomerStore + SubscriptionStore + BillingPeriodStore + EventStore,
{
    if event.quantity <= rust_decimal::Decimal::ZERO {
        return Err(BillingError::validation("quantity", "quantity must be positive"));
    }
    store.get_customer(event.customer_id).await?;

    let event_time = event.event_time.unwrap_or(now);
    let (subscription_id, billing_period_id) =
        resolve_billing_period(store, event.customer_id, event_time).await?;

    let usage_event = UsageEvent {
        id: UsageEventId::from(sequence.next()),
        customer_id: event.customer_id,
        subscription_id,
        billing_period_id,
        metric_name: event.metric_name,
        metric_id: event.metric_id,
        quantity: event.quantity,
        event_time,
        properties: event.properties,
        created_at: now,
    };

    store.insert_event(usage_event).await
}

async fn resolve_billing_period<S>(
    store: &S,
    customer_id: CustomerId,
    event_time: OffsetDateTime,
) -> Result<(Option<crate::ids::SubscriptionId>, Option<crate::ids::BillingPeriodId>)>
where
    S: SubscriptionStore + BillingPeriodStore,
{
    let subscriptions = store.list_subscriptions_for_customer(customer_id).await?;
    for subscription in subscriptions
        .iter()
        .filter(|s| s.active && s.covers(event_time))
    {
        let periods = store
            .list_billing_periods_for_subscription(subscription.id)
            .await?;
        if let Some(period) = find_period_for(&periods, event_time) {
            return Ok((Some(subscription.id), Some(period.id)));
        }
    }
    Ok((None, None))
}

/// Processes each event in order, never failing the whole batch: an event
/// whose customer does not exist (or whose quantity is invalid) is skipped
/// and its `Result` reported back to the caller; the rest of the batch still
/// proceeds.
pub async fn batch_track<S>(
    store: &S,
    sequence: &IdSequence,
    now: OffsetDateTime,
    events: Vec<NewUsageEvent>,
) -> Vec<Result<UsageEvent>>
where
    S: CustomerStore + SubscriptionStore + BillingPeriodStore + crate::store::EventStore,
{
    let mut results = Vec::with_capacity(events.len());
    for event in events {
        let outcome = track(store, sequence, now, event).await;
        if let Err(ref e) = outcome {
            warn!(error = %e, "skipped usage event in batch");
        }
        results.push(outcome);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PlanId;
    use crate::model::{Customer, Subscription};
    use crate::store::memory::MemoryStore;
    use crate::store::{PlanStore as _, SubscriptionStore as _};
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    #[tokio::test]
    async fn event_without_covering_subscription_is_still_recorded() {
        let store = MemoryStore::new();
        let now = datetime!(2024-01-15 00:00:00 UTC);
        store
            .insert_customer(Customer::new(
                CustomerId(1),
                "a@example.com".into(),
                "A".into(),
                now,
            ))
            .await
            .unwrap();

        let sequence = IdSequence::new();
        let event = track(
            &store,
            &sequence,
            now,
            NewUsageEvent {
                customer_id: CustomerId(1),
                metric_name: "api_calls".into(),
                metric_id: None,
                quantity: dec!(5),
                event_time: None,
                properties: HashMap::new(),
            },
        )
        .await
        .unwrap();

        assert!(event.billing_period_id.is_none());
    }

    #[tokio::test]
    async fn event_attaches_to_covering_billing_period() {
        let store = MemoryStore::new();
        let now = datetime!(2024-01-15 00:00:00 UTC);
        store
            .insert_customer(Customer::new(
                CustomerId(1),
                "a@example.com".into(),
                "A".into(),
                now,
            ))
            .await
            .unwrap();
        store
            .insert_plan(crate::model::Plan {
                id: PlanId(1),
                name: "Plan".into(),
                description: "".into(),
                billing_frequency: crate::model::BillingFrequency::Monthly,
                active: true,
                components: vec![],
            })
            .await
            .unwrap();
        let subscription = Subscription {
            id: crate::ids::SubscriptionId(1),
            customer_id: CustomerId(1),
            plan_id: PlanId(1),
            start: datetime!(2024-01-01 00:00:00 UTC),
            end: None,
            active: true,
        };
        store.insert_subscription(subscription.clone()).await.unwrap();
        let bp_sequence = IdSequence::new();
        let periods = super::super::billing_periods::generate_periods(
            &subscription,
            crate::model::BillingFrequency::Monthly,
            now,
            &bp_sequence,
        );
        store.insert_billing_periods(periods).await.unwrap();

        let sequence = IdSequence::new();
        let event = track(
            &store,
            &sequence,
            now,
            NewUsageEvent {
                customer_id: CustomerId(1),
                metric_name: "api_calls".into(),
                metric_id: None,
                quantity: dec!(5),
                event_time: Some(now),
                properties: HashMap::new(),
            },
        )
        .await
        .unwrap();

        assert!(event.billing_period_id.is_some());
    }
}
