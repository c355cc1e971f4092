use thiserror::Error;

/// An error returned by the billing engine.
///
/// Each variant corresponds to one of the error kinds and HTTP-status
/// mapping a caller sitting in front of this crate would apply
/// (`NotFound` -> 404, `Conflict` -> 400/409, `ValidationFailure` -> 400,
/// `StateViolation` -> 400, `TransactionRollback` -> 500). Callers can match
/// on the variant alone; they never need to parse the message.
#[derive(Debug, Error)]
pub enum BillingError {
    /// The referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// The kind of entity that was looked up (e.g. "customer", "plan").
        kind: &'static str,
        /// A human-readable identifier (id or name) used in the lookup.
        id: String,
    },
    /// The requested write would violate a uniqueness constraint.
    #[error("conflict on {kind}: {detail}")]
    Conflict {
        /// The kind of entity the conflict occurred on.
        kind: &'static str,
        /// A description of the conflicting value.
        detail: String,
    },
    /// The caller-supplied data failed validation.
    #[error("validation failed for field {field}: {detail}")]
    ValidationFailure {
        /// The field that failed validation.
        field: &'static str,
        /// A description of why validation failed.
        detail: String,
    },
    /// The requested operation is not permitted given the entity's current
    /// lifecycle state (e.g. adding an item to a non-draft invoice).
    #[error("invalid state transition on {kind}: {detail}")]
    StateViolation {
        /// The kind of entity whose state was violated.
        kind: &'static str,
        /// A description of the violated invariant.
        detail: String,
    },
    /// The underlying transaction could not be committed; no partial state
    /// was persisted.
    #[error("transaction rolled back: {0}")]
    TransactionRollback(String),
}

impl BillingError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        BillingError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn conflict(kind: &'static str, detail: impl Into<String>) -> Self {
        BillingError::Conflict {
            kind,
            detail: detail.into(),
        }
    }

    pub(crate) fn validation(field: &'static str, detail: impl Into<String>) -> Self {
        BillingError::ValidationFailure {
            field,
            detail: detail.into(),
        }
    }

    pub(crate) fn state_violation(kind: &'static str, detail: impl Into<String>) -> Self {
        BillingError::StateViolation {
            kind,
            detail: detail.into(),
        }
    }
}

/// A convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, BillingError>;
