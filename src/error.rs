//! # Errors
//!
//! Error type shared by the store seams, the update helper and the
//! reconciler chain.

use std::fmt;
use thiserror::Error;

/// Result alias used across the controller
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Any failure reported by the Kubernetes API that has no dedicated variant
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A write was rejected because the caller's resourceVersion is stale
    #[error("conflict writing {kind} {name}: object has been modified")]
    StaleResourceVersion { kind: &'static str, name: String },

    /// The update helper gave up after repeated conflicts
    #[error("conflict updating ManagedCluster {name} persisted after {attempts} attempts")]
    Conflict { name: String, attempts: u32 },

    /// The object addressed by a write does not exist (anymore)
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// A `group/version/resource` descriptor could not be parsed
    #[error("invalid resource descriptor '{0}': expected group/version/resource")]
    InvalidDescriptor(String),

    /// Several errors raised during one cleanup pass
    #[error("{0}")]
    Aggregate(AggregateError),
}

impl Error {
    /// Whether the error is a rejected optimistic-concurrency write
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::StaleResourceVersion { .. } | Error::Conflict { .. } => true,
            Error::Kube(e) => is_conflict(e),
            _ => false,
        }
    }

    /// Whether the error means the addressed object is already gone
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(e) => is_not_found(e),
            _ => false,
        }
    }
}

/// Whether the API server answered 404
#[must_use]
pub fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

/// Whether the API server answered 409
#[must_use]
pub fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 409)
}

/// Ordered collection of errors from one pass of the reconciler chain
///
/// Displays a single error as its own message and several errors as
/// `[first, second, ...]` so every constituent message is preserved.
#[derive(Debug, Default)]
pub struct AggregateError(Vec<Error>);

impl AggregateError {
    /// Build an aggregate, returning `None` when there is nothing to report
    ///
    /// Nested aggregates are flattened so the message never nests brackets.
    #[must_use]
    pub fn from_errors(errors: Vec<Error>) -> Option<Self> {
        let mut flat = Vec::with_capacity(errors.len());
        for error in errors {
            match error {
                Error::Aggregate(AggregateError(inner)) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.is_empty() {
            None
        } else {
            Some(Self(flat))
        }
    }

    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_errors(&self.0))
    }
}

/// Render errors the way `AggregateError` displays them
#[must_use]
pub fn join_errors(errors: &[Error]) -> String {
    match errors {
        [only] => only.to_string(),
        _ => {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            format!("[{}]", messages.join(", "))
        }
    }
}

impl std::error::Error for AggregateError {}

impl From<AggregateError> for Error {
    fn from(aggregate: AggregateError) -> Self {
        Error::Aggregate(aggregate)
    }
}
