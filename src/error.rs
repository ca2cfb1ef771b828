//! Error taxonomy for the order relay.
//!
//! Validation failures reject the whole request before anything is persisted.
//! Dispatch failures are aggregated per destination and only ever surface as
//! an order status, never as a request failure. Notification and backup
//! failures are internal: logged and swallowed by their callers.

use thiserror::Error;

/// A `create_order` precondition failure. Checked in declaration order,
/// first failure wins; no order is persisted when any of these fire.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("user {0} has no branch assigned")]
    NoBranchAssigned(i64),

    #[error("branch {0} not found")]
    BranchNotFound(i64),

    #[error("product {0} not found")]
    ProductNotFound(i64),

    #[error("product '{name}' is not available at branch {branch_id}")]
    ProductNotAvailableAtBranch { name: String, branch_id: i64 },

    #[error("quantity for product {product_id} must be greater than zero (got {quantity})")]
    InvalidQuantity { product_id: i64, quantity: f64 },

    #[error("order contains no items")]
    EmptyOrder,
}

/// A single destination failed to accept its batch. Carried inside the
/// dispatch outcome; the order itself is still created.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("destination p{0} has no configured endpoint")]
    UnknownDestination(i64),

    #[error("destination p{destination}: {source}")]
    Transport {
        destination: i64,
        #[source]
        source: reqwest::Error,
    },

    #[error("destination p{destination} rejected the batch (HTTP {status})")]
    BadStatus { destination: i64, status: u16 },
}

impl DispatchError {
    /// The routing target this failure belongs to.
    pub fn destination(&self) -> i64 {
        match self {
            DispatchError::UnknownDestination(d) => *d,
            DispatchError::Transport { destination, .. } => *destination,
            DispatchError::BadStatus { destination, .. } => *destination,
        }
    }
}

/// Notification channel failure. Logged by the caller, never propagated.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification channel rejected the message (HTTP {0})")]
    BadStatus(u16),
}

/// Daily backup failure. Logged by the scheduler loop, which then waits for
/// the next midnight regardless.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("archive: {0}")]
    Archive(#[from] std::io::Error),

    #[error("archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("upload transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backup channel rejected the bundle (HTTP {status}): {body}")]
    BadStatus { status: u16, body: String },
}

/// Persistence seam failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store mutex poisoned")]
    Poisoned,

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        StoreError::NotFound { entity, id }
    }
}

/// Errors surfaced by the end-to-end submit flow. Validation rejects the
/// request; a store failure means the order could not be persisted at all.
/// Dispatch failure is deliberately absent: once validation passes the flow
/// always returns a created order, with the outcome reflected in its status.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_name_the_offender() {
        let err = ValidationError::ProductNotAvailableAtBranch {
            name: "Lavash".into(),
            branch_id: 3,
        };
        assert_eq!(
            err.to_string(),
            "product 'Lavash' is not available at branch 3"
        );

        let err = ValidationError::InvalidQuantity {
            product_id: 9,
            quantity: -1.5,
        };
        assert!(err.to_string().contains("product 9"));
        assert!(err.to_string().contains("-1.5"));
    }

    #[test]
    fn dispatch_error_reports_its_destination() {
        let err = DispatchError::BadStatus {
            destination: 2,
            status: 503,
        };
        assert_eq!(err.destination(), 2);
        assert!(err.to_string().contains("p2"));

        assert_eq!(DispatchError::UnknownDestination(7).destination(), 7);
    }
}
