use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::CustomerId;

/// A billable party. Owns subscriptions, usage events, invoices, and credit
/// balances, all of which reference this id rather than embedding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// The engine-assigned unique identifier for the customer.
    pub id: CustomerId,
    /// A unique email used to identify the customer.
    pub email: String,
    /// The customer's display name.
    pub name: String,
    /// An opaque handle to an external payment method, if one is on file.
    pub payment_method_handle: Option<String>,
    /// The time at which the customer was created.
    pub created_at: OffsetDateTime,
    /// The time at which the customer was last updated.
    pub updated_at: OffsetDateTime,
}

impl Customer {
    pub(crate) fn new(id: CustomerId, email: String, name: String, now: OffsetDateTime) -> Self {
        Customer {
            id,
            email,
            name,
            payment_method_handle: None,
            created_at: now,
            updated_at: now,
        }
    }
}
