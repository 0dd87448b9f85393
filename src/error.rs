use serde_dynamo::Error as SerdeDynamoError;
use std::fmt;

/// Classification of a failed store call.
///
/// The core only distinguishes the cases it can act upon; everything else is
/// reported as [`TransportErrorKind::Service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The store refused to navigate into a map or list that does not exist.
    MissingPath,
    /// A condition attached to the request evaluated to false.
    ConditionFailed,
    /// Conversion between native values and wire values failed.
    Serialization,
    /// Any other service, network or throttling failure.
    Service,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPath => write!(f, "missing path"),
            Self::ConditionFailed => write!(f, "condition failed"),
            Self::Serialization => write!(f, "serialization"),
            Self::Service => write!(f, "service"),
        }
    }
}

/// Opaque failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} failure: {message}")]
pub struct TransportError {
    /// What kind of failure occurred
    pub kind: TransportErrorKind,
    /// Store supplied detail
    pub message: String,
}

impl TransportError {
    /// Build a new transport error.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a [`TransportErrorKind::MissingPath`] failure.
    pub fn missing_path(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::MissingPath, message)
    }

    /// Shorthand for a [`TransportErrorKind::Service`] failure.
    pub fn service(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Service, message)
    }

    /// Check if the store rejected the request because an ancestor map is missing
    ///
    /// This is the only failure that triggers auto-initialisation.
    pub fn is_missing_path(&self) -> bool {
        self.kind == TransportErrorKind::MissingPath
    }

    /// Check if the failure is a conditional check failure
    pub fn is_conditional_check_failed(&self) -> bool {
        self.kind == TransportErrorKind::ConditionFailed
    }
}

impl From<SerdeDynamoError> for TransportError {
    fn from(e: SerdeDynamoError) -> Self {
        Self::new(TransportErrorKind::Serialization, e.to_string())
    }
}

/// Field access error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A path segment names a field the schema does not declare at that depth
    #[error("unknown field '{segment}' in path '{path}'")]
    UnknownField {
        /// Full path expression
        path: String,
        /// Offending segment
        segment: String,
    },
    /// A declared field name contains an expression syntax character
    #[error("field name '{field}' contains reserved character '{character}'")]
    ReservedCharacter {
        /// Declared field name
        field: String,
        /// Offending character
        character: char,
    },
    /// A `{{name}}` placeholder has no matching substitution
    #[error("no substitution supplied for '{{{{{name}}}}}' in path '{path}'")]
    MissingSubstitution {
        /// Full path expression
        path: String,
        /// Placeholder name
        name: String,
    },
    /// A list segment did not resolve to a non-negative integer
    #[error("list index '{value}' in path '{path}' is not a non-negative integer")]
    InvalidListIndex {
        /// Full path expression
        path: String,
        /// Rejected value
        value: String,
    },
    /// The path expression is malformed
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// Full path expression
        path: String,
        /// What is wrong with it
        reason: String,
    },
    /// The validation capability rejected a value
    #[error("value rejected by validation for field '{path}'")]
    Validation {
        /// Joined path of the rejected field
        path: String,
    },
    /// An ancestor initialisation call failed
    #[error("failed to initialise '{path}': {source}")]
    InitializationFailed {
        /// Joined path of the prefix that could not be initialised
        path: String,
        /// The transport failure
        #[source]
        source: TransportError,
    },
    /// Serde DynamoDB serialization/deserialization error
    #[error("DynamoDB serialization error: {0}")]
    SerdeDynamo(#[from] SerdeDynamoError),
}

impl Error {
    /// Check if the error reports an undeclared field
    pub fn is_unknown_field(&self) -> bool {
        matches!(self, Error::UnknownField { .. })
    }

    /// Check if the error is a validation rejection
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Check if the error came from a failed auto-initialisation
    pub fn is_initialization_failure(&self) -> bool {
        matches!(self, Error::InitializationFailed { .. })
    }

    /// Check if the error is raised while resolving a path expression
    ///
    /// Returns `true` for unknown fields, missing substitutions, bad list
    /// indices and malformed expressions.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownField { .. }
                | Error::MissingSubstitution { .. }
                | Error::InvalidListIndex { .. }
                | Error::InvalidPath { .. }
        )
    }
}
