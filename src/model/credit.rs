use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{CreditBalanceId, CreditTransactionId, CustomerId, InvoiceId, SubscriptionId};

/// The origin of a credit grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditType {
    Prepaid,
    Refund,
    Promotional,
    Adjustment,
}

/// The lifecycle state of a credit balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    Active,
    Expired,
    Consumed,
    Cancelled,
}

/// A prepaid or granted amount that invoices draw down in expiration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub id: CreditBalanceId,
    pub customer_id: CustomerId,
    pub original_amount: Decimal,
    pub remaining_amount: Decimal,
    pub credit_type: CreditType,
    pub status: CreditStatus,
    pub expires_at: Option<OffsetDateTime>,
    pub description: String,
    pub subscription_id: Option<SubscriptionId>,
    pub invoice_id: Option<InvoiceId>,
    pub created_at: OffsetDateTime,
}

impl CreditBalance {
    /// Whether this balance is currently drawable: active and, if it has an
    /// expiry, not yet expired as of `now`.
    pub fn is_available(&self, now: OffsetDateTime) -> bool {
        self.status == CreditStatus::Active
            && self.remaining_amount > Decimal::ZERO
            && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

/// An append-only log entry recording a grant (positive) or draw (negative)
/// against a [`CreditBalance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: CreditTransactionId,
    pub balance_id: CreditBalanceId,
    pub amount: Decimal,
    pub invoice_id: Option<InvoiceId>,
    pub created_at: OffsetDateTime,
}
