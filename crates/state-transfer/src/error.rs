//! Error types for transfer orchestration
//!
//! Cluster API failures are carried verbatim inside [`Error::Kube`] so callers can
//! still inspect the HTTP status. Steps that run independently of each other
//! (config + secret creation, multi-pod health checks) report every failure through
//! [`Error::Aggregate`] instead of stopping at the first one.

use std::fmt;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for transfer operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Tunnel configuration could not be rendered
    #[error("template error [{template}]: {source}")]
    Template {
        /// Name of the template being rendered
        template: String,
        /// The underlying minijinja error
        #[source]
        source: minijinja::Error,
    },

    /// TLS material could not be generated or parsed
    #[error("pki error: {message}")]
    Pki {
        /// Description of what failed
        message: String,
    },

    /// Invalid input (options, kind registration, supplied material)
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid field (e.g., "caVerifyLevel")
        field: Option<String>,
    },

    /// A probed pod is not healthy
    #[error("{message}")]
    Health {
        /// Namespaced name of the pod (`namespace/name`)
        pod: String,
        /// Description of why the pod is not healthy
        message: String,
    },

    /// Several independent steps failed
    #[error(transparent)]
    Aggregate(AggregateError),

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "connect", "telemetry")
        context: String,
    },
}

impl Error {
    /// Create a template error for the named template
    pub fn template(template: impl Into<String>, source: minijinja::Error) -> Self {
        Self::Template {
            template: template.into(),
            source,
        }
    }

    /// Create a PKI error with the given message
    pub fn pki(msg: impl Into<String>) -> Self {
        Self::Pki {
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a health error for a pod
    pub fn health(pod: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Health {
            pod: pod.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Combine independent failures into one error
    ///
    /// Returns `Ok(())` when `errors` is empty.
    pub fn aggregate(errors: Vec<Error>) -> Result<(), Error> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(AggregateError { errors }))
        }
    }

    /// Check if the API server rejected a create because the object exists
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 409 && ae.reason == "AlreadyExists"
        )
    }

    /// Check if the API server reported the object as missing
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 404
        )
    }

    /// Check if this error describes the probed workload rather than the
    /// infrastructure used to probe it
    ///
    /// Aggregates count as health errors only when every cause is one.
    pub fn is_health(&self) -> bool {
        match self {
            Error::Health { .. } => true,
            Error::Aggregate(agg) => agg.errors.iter().all(Error::is_health),
            _ => false,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

/// Several errors reported together
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<Error>,
}

impl AggregateError {
    /// The individual causes, in the order they occurred
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Number of causes
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether there are no causes (never true for one built by [`Error::aggregate`])
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [only] = self.errors.as_slice() {
            return write!(f, "{}", only);
        }
        write!(f, "[")?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use kube::error::ErrorResponse;

    /// Build the error the API server returns when creating an existing object
    pub fn already_exists(kind: &str, name: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} \"{}\" already exists", kind, name),
            reason: "AlreadyExists".to_string(),
            code: 409,
        })
    }

    /// Build the error the API server returns for a missing object
    pub fn not_found(kind: &str, name: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} \"{}\" not found", kind, name),
            reason: "NotFound".to_string(),
            code: 404,
        })
    }

    /// Build a generic server-side failure
    pub fn internal_error(message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: "InternalError".to_string(),
            code: 500,
        })
    }
}
