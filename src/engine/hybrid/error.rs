//! Federated query errors
//!
//! Only two failures ever reach a caller. Orphans and invariant violations
//! are reported as warnings on a successful result instead.

use thiserror::Error;

use crate::engine::vocab::StoreKind;

/// Malformed or contradictory predicate / pagination input
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    /// Wire name of the offending field
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FederationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{store} store unavailable: {reason}")]
    UpstreamUnavailable { store: StoreKind, reason: String },
}

impl FederationError {
    pub fn upstream(store: StoreKind, reason: impl Into<String>) -> Self {
        FederationError::UpstreamUnavailable {
            store,
            reason: reason.into(),
        }
    }
}

pub type FederationResult<T> = Result<T, FederationError>;
