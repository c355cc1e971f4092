//! The subscription manager: customer-plan binding lifecycle, generating
//! billing periods on activation.

use time::OffsetDateTime;
use tracing::info;

use crate::error::Result;
use crate::ids::{CustomerId, IdSequence, PlanId, SubscriptionId};
use crate::model::{BillingFrequency, Subscription};
use crate::store::{BillingPeriodStore, CustomerStore, PlanStore, SubscriptionStore};

use super::billing_periods::generate_periods;

/// Creates a subscription and, in the same logical transaction, generates
/// and persists its billing periods.
pub async fn create<S>(
    store: &S,
    subscription_sequence: &IdSequence,
    period_sequence: &IdSequence,
    now: OffsetDateTime,
    customer_id: CustomerId,
    plan_id: PlanId,
    start: Option<OffsetDateTime>,
    end: Option<OffsetDateTime>,
) -> Result<Subscription>
where
    S: CustomerStore + PlanStore + SubscriptionStore + BillingPeriodStore,
{
    store.get_customer(customer_id).await?;
    let plan = store.get_plan(plan_id).await?;

    let subscription = Subscription {
        id: SubscriptionId::from(subscription_sequence.next()),
        customer_id,
        plan_id,
        start: start.unwrap_or(now),
        end,
        active: true,
    };
    let subscription = store.insert_subscription(subscription).await?;

    let periods = generate_periods(&subscription, plan.billing_frequency, now, period_sequence);
    store.insert_billing_periods(periods).await?;

    info!(subscription_id = %subscription.id, customer_id = %customer_id, "subscription created");
    Ok(subscription)
}

/// Cancels a subscription: sets `active = false` and `end`, defaulting to
/// `now`. Existing billing periods are left in place as historical
/// boundaries.
pub async fn cancel(
    store: &impl SubscriptionStore,
    id: SubscriptionId,
    end: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Result<Subscription> {
    let mut subscription = store.get_subscription(id).await?;
    subscription.active = false;
    subscription.end = Some(end.unwrap_or(now));
    info!(subscription_id = %id, "subscription cancelled");
    store.update_subscription(subscription).await
}

pub async fn get(store: &impl SubscriptionStore, id: SubscriptionId) -> Result<Subscription> {
    store.get_subscription(id).await
}

pub async fn list_for_customer(
    store: &impl SubscriptionStore,
    customer_id: CustomerId,
    active_only: bool,
) -> Result<Vec<Subscription>> {
    let subscriptions = store.list_subscriptions_for_customer(customer_id).await?;
    Ok(if active_only {
        subscriptions.into_iter().filter(|s| s.active).collect()
    } else {
        subscriptions
    })
}

/// Normalizes a raw frequency string the same way the plan store does, for
/// callers that need to preview period generation before a plan exists.
pub fn normalize_frequency(value: &str) -> BillingFrequency {
    BillingFrequency::normalize_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Customer, Plan};
    use crate::store::memory::MemoryStore;
    use time::macros::datetime;

    #[tokio::test]
    async fn creation_persists_billing_periods() {
        let store = MemoryStore::new();
        let now = datetime!(2024-01-01 00:00:00 UTC);
        store
            .insert_customer(Customer::new(CustomerId(1), "a@example.com".into(), "A".into(), now))
            .await
            .unwrap();
        store
            .insert_plan(Plan {
                id: PlanId(1),
                name: "Plan".into(),
                description: "".into(),
                billing_frequency: BillingFrequency::Monthly,
                active: true,
                components: vec![],
            })
            .await
            .unwrap();

        let subscription_sequence = IdSequence::new();
        let period_sequence = IdSequence::new();
        let subscription = create(
            &store,
            &subscription_sequence,
            &period_sequence,
            now,
            CustomerId(1),
            PlanId(1),
            None,
            Some(datetime!(2024-04-01 00:00:00 UTC)),
        )
        .await
        .unwrap();

        let periods = store
            .list_billing_periods_for_subscription(subscription.id)
            .await
            .unwrap();
        assert_eq!(periods.len(), 3);
    }

    #[tokio::test]
    async fn cancel_sets_inactive_and_end() {
        let store = MemoryStore::new();
        let now = datetime!(2024-01-01 00:00:00 UTC);
        store
            .insert_customer(Customer::new(CustomerId(1), "a@example.com".into(), "A".into(), now))
            .await
            .unwrap();
        store
            .insert_plan(Plan {
                id: PlanId(1),
                name: "Plan".into(),
                description: "".into(),
                billing_frequency: BillingFrequency::Monthly,
                active: true,
                components: vec![],
            })
            .await
            .unwrap();
        let subscription_sequence = IdSequence::new();
        let period_sequence = IdSequence::new();
        let subscription = create(
            &store,
            &subscription_sequence,
            &period_sequence,
            now,
            CustomerId(1),
            PlanId(1),
            None,
            None,
        )
        .await
        .unwrap();

        let cancelled = cancel(&store, subscription.id, None, now).await.unwrap();
        assert!(!cancelled.active);
        assert_eq!(cancelled.end, Some(now));
    }
}
