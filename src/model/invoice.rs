use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{CustomerId, InvoiceId, InvoiceItemId, SubscriptionId};

/// The lifecycle state of an invoice.
///
/// `draft` is mutable; `pending` and beyond freeze items. `paid` and `void`
/// are terminal, and a paid invoice may never be voided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Paid,
    Failed,
    Void,
}

impl InvoiceStatus {
    /// Whether items may still be added to or removed from an invoice in
    /// this state.
    pub fn is_mutable(self) -> bool {
        matches!(self, InvoiceStatus::Draft)
    }
}

/// One line on an invoice. A credit application is represented as an item
/// with a negative `amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: InvoiceItemId,
    pub invoice_id: InvoiceId,
    pub description: String,
    pub metric_name: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub subscription_id: Option<SubscriptionId>,
}

/// A billing document issued to a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub customer_id: CustomerId,
    /// Globally unique across all invoices ever issued.
    pub number: String,
    pub status: InvoiceStatus,
    pub issue_date: OffsetDateTime,
    pub due_date: OffsetDateTime,
    /// The post-credit total; equals the sum of item amounts before credits
    /// are applied, and `max(0, pre_credit_total - credits_applied)` after.
    pub amount: Decimal,
    pub paid_date: Option<OffsetDateTime>,
    pub notes: String,
    pub items: Vec<InvoiceItem>,
}

impl Invoice {
    /// Recomputes `amount` as the sum of current item amounts. Invoice
    /// assembly and `add_item`/`remove_item` both funnel through this so the
    /// "sum of items equals `amount`" invariant can never drift.
    pub fn recompute_amount(&mut self) {
        self.amount = self.items.iter().map(|item| item.amount).sum();
    }
}
