//! The credit engine: grants, ordered application, and expiration sweeping.

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::info;

use crate::error::{BillingError, Result};
use crate::ids::{CreditBalanceId, CreditTransactionId, CustomerId, IdSequence, InvoiceId, SubscriptionId};
use crate::model::{CreditBalance, CreditStatus, CreditTransaction, CreditType};
use crate::store::CreditStore;

/// One credit balance drawn down during a single application pass.
#[derive(Debug, Clone)]
pub struct AppliedCredit {
    pub balance_id: CreditBalanceId,
    pub amount: Decimal,
    pub description: String,
}

/// Grants a new, immediately active credit balance and logs the initial
/// grant transaction.
#[allow(clippy::too_many_arguments)]
pub async fn add_credits(
    store: &impl CreditStore,
    balance_sequence: &IdSequence,
    transaction_sequence: &IdSequence,
    customer_id: CustomerId,
    amount: Decimal,
    credit_type: CreditType,
    description: String,
    expires_at: Option<OffsetDateTime>,
    subscription_id: Option<SubscriptionId>,
    invoice_id: Option<InvoiceId>,
    now: OffsetDateTime,
) -> Result<CreditBalance> {
    if amount <= Decimal::ZERO {
        return Err(BillingError::validation("amount", "credit amount must be positive"));
    }
    let balance = CreditBalance {
        id: CreditBalanceId::from(balance_sequence.next()),
        customer_id,
        original_amount: amount,
        remaining_amount: amount,
        credit_type,
        status: CreditStatus::Active,
        expires_at,
        description,
        subscription_id,
        invoice_id,
        created_at: now,
    };
    let balance = store.insert_credit_balance(balance).await?;
    store
        .insert_credit_transaction(CreditTransaction {
            id: CreditTransactionId::from(transaction_sequence.next()),
            balance_id: balance.id,
            amount,
            invoice_id: None,
            created_at: now,
        })
        .await?;
    Ok(balance)
}

/// The sum of `remaining_amount` over every active, non-expired balance.
pub async fn available_balance(
    store: &impl CreditStore,
    customer_id: CustomerId,
    now: OffsetDateTime,
) -> Result<Decimal> {
    let balances = store.list_credit_balances_for_customer(customer_id).await?;
    Ok(balances
        .iter()
        .filter(|b| b.is_available(now))
        .map(|b| b.remaining_amount)
        .sum())
}

/// Draws down available balances in expiry order to cover `invoice_remaining`,
/// returning the post-application remainder (`max(0, ...)`) and the list of
/// draws made, for the invoice assembler to turn into line items.
pub async fn apply_to_invoice(
    store: &impl CreditStore,
    transaction_sequence: &IdSequence,
    customer_id: CustomerId,
    invoice_id: InvoiceId,
    invoice_remaining: Decimal,
    now: OffsetDateTime,
) -> Result<(Decimal, Vec<AppliedCredit>)> {
    let mut remaining = invoice_remaining;
    let mut applied = Vec::new();
    let mut balances = drawable_balances(store, customer_id, now).await?;

    for balance in balances.iter_mut() {
        if remaining <= Decimal::ZERO {
            break;
        }
        let draw = remaining.min(balance.remaining_amount);
        balance.remaining_amount -= draw;
        remaining -= draw;
        if balance.remaining_amount.is_zero() {
            balance.status = CreditStatus::Consumed;
        }
        store.update_credit_balance(balance.clone()).await?;
        store
            .insert_credit_transaction(CreditTransaction {
                id: CreditTransactionId::from(transaction_sequence.next()),
                balance_id: balance.id,
                amount: -draw,
                invoice_id: Some(invoice_id),
                created_at: now,
            })
            .await?;
        applied.push(AppliedCredit {
            balance_id: balance.id,
            amount: draw,
            description: format!(
                "Credit applied from {:?} balance #{}",
                balance.credit_type, balance.id.0
            ),
        });
    }

    Ok((remaining.max(Decimal::ZERO), applied))
}

/// Draws down available balances in expiry order to cover `requested`,
/// without writing any invoice line items. Fails if insufficient credit is
/// available.
pub async fn apply_manual(
    store: &impl CreditStore,
    transaction_sequence: &IdSequence,
    customer_id: CustomerId,
    requested: Decimal,
    now: OffsetDateTime,
) -> Result<Vec<AppliedCredit>> {
    if requested <= Decimal::ZERO {
        return Err(BillingError::validation("amount", "requested amount must be positive"));
    }
    let available = available_balance(store, customer_id, now).await?;
    if available < requested {
        return Err(BillingError::conflict(
            "credit_balance",
            format!("requested {requested} exceeds available {available}"),
        ));
    }

    let mut remaining = requested;
    let mut applied = Vec::new();
    let mut balances = drawable_balances(store, customer_id, now).await?;

    for balance in balances.iter_mut() {
        if remaining <= Decimal::ZERO {
            break;
        }
        let draw = remaining.min(balance.remaining_amount);
        balance.remaining_amount -= draw;
        remaining -= draw;
        if balance.remaining_amount.is_zero() {
            balance.status = CreditStatus::Consumed;
        }
        store.update_credit_balance(balance.clone()).await?;
        store
            .insert_credit_transaction(CreditTransaction {
                id: CreditTransactionId::from(transaction_sequence.next()),
                balance_id: balance.id,
                amount: -draw,
                invoice_id: None,
                created_at: now,
            })
            .await?;
        applied.push(AppliedCredit {
            balance_id: balance.id,
            amount: draw,
            description: format!(
                "Credit applied from {:?} balance #{}",
                balance.credit_type, balance.id.0
            ),
        });
    }

    Ok(applied)
}

async fn drawable_balances(
    store: &impl CreditStore,
    customer_id: CustomerId,
    now: OffsetDateTime,
) -> Result<Vec<CreditBalance>> {
    let mut balances: Vec<CreditBalance> = store
        .list_credit_balances_for_customer(customer_id)
        .await?
        .into_iter()
        .filter(|b| b.is_available(now))
        .collect();
    balances.sort_by(|a, b| match (a.expires_at, b.expires_at) {
        (Some(x), Some(y)) => x.cmp(&y).then(a.created_at.cmp(&b.created_at)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.created_at.cmp(&b.created_at),
    });
    Ok(balances)
}

/// Transitions every active, expired balance to `expired`, logging a
/// negative transaction for whatever remained. Returns the number of
/// balances swept.
pub async fn sweep_expired(
    store: &impl CreditStore,
    transaction_sequence: &IdSequence,
    now: OffsetDateTime,
) -> Result<usize> {
    let balances = store.list_all_credit_balances().await?;
    let mut swept = 0;
    for mut balance in balances {
        let is_expired = balance.status == CreditStatus::Active
            && balance.expires_at.map(|exp| now >= exp).unwrap_or(false);
        if !is_expired {
            continue;
        }
        let remaining = balance.remaining_amount;
        balance.remaining_amount = Decimal::ZERO;
        balance.status = CreditStatus::Expired;
        store.update_credit_balance(balance.clone()).await?;
        if remaining > Decimal::ZERO {
            store
                .insert_credit_transaction(CreditTransaction {
                    id: CreditTransactionId::from(transaction_sequence.next()),
                    balance_id: balance.id,
                    amount: -remaining,
                    invoice_id: None,
                    created_at: now,
                })
                .await?;
        }
        info!(balance_id = %balance.id, "credit balance expired");
        swept += 1;
    }
    Ok(swept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    #[tokio::test]
    async fn credit_ordering_matches_scenario() {
        let store = MemoryStore::new();
        let balance_sequence = IdSequence::new();
        let transaction_sequence = IdSequence::new();
        let now = datetime!(2024-01-01 00:00:00 UTC);

        add_credits(
            &store,
            &balance_sequence,
            &transaction_sequence,
            CustomerId(1),
            dec!(50),
            CreditType::Prepaid,
            "A".into(),
            Some(datetime!(2024-06-01 00:00:00 UTC)),
            None,
            None,
            now,
        )
        .await
        .unwrap();
        add_credits(
            &store,
            &balance_sequence,
            &transaction_sequence,
            CustomerId(1),
            dec!(30),
            CreditType::Prepaid,
            "B".into(),
            Some(datetime!(2024-05-01 00:00:00 UTC)),
            None,
            None,
            now,
        )
        .await
        .unwrap();

        let (remaining, applied) = apply_to_invoice(
            &store,
            &transaction_sequence,
            CustomerId(1),
            InvoiceId(1),
            dec!(60),
            now,
        )
        .await
        .unwrap();

        assert_eq!(remaining, dec!(0));
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].amount, dec!(30));
        assert_eq!(applied[1].amount, dec!(30));

        let balances = store
            .list_credit_balances_for_customer(CustomerId(1))
            .await
            .unwrap();
        let a = balances.iter().find(|b| b.description == "A").unwrap();
        let b = balances.iter().find(|b| b.description == "B").unwrap();
        assert_eq!(a.remaining_amount, dec!(20));
        assert_eq!(a.status, CreditStatus::Active);
        assert_eq!(b.remaining_amount, dec!(0));
        assert_eq!(b.status, CreditStatus::Consumed);
    }

    #[tokio::test]
    async fn manual_application_fails_when_insufficient() {
        let store = MemoryStore::new();
        let balance_sequence = IdSequence::new();
        let transaction_sequence = IdSequence::new();
        let now = datetime!(2024-01-01 00:00:00 UTC);
        add_credits(
            &store,
            &balance_sequence,
            &transaction_sequence,
            CustomerId(1),
            dec!(10),
            CreditType::Adjustment,
            "small".into(),
            None,
            None,
            None,
            now,
        )
        .await
        .unwrap();

        let err = apply_manual(&store, &transaction_sequence, CustomerId(1), dec!(100), now)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Conflict { .. }));
    }
}
