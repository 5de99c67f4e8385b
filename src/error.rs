//! Error types for hotswap-handlers.

use std::fmt;

/// Result type alias for hotswap-handlers operations.
pub type Result<T> = std::result::Result<T, ReloadError>;

/// Errors that can occur while loading units, reloading configuration or
/// resolving handlers.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// A unit's source artifact could not be read, parsed or bound.
    ///
    /// The unit keeps its previous registration (or stays unregistered if it
    /// never loaded successfully).
    #[error("Failed to load unit '{unit}': {reason}")]
    LoadFailure {
        /// Name of the unit that failed to load
        unit: String,
        /// Human-readable cause
        reason: String,
    },

    /// No handler is registered under the requested unit/handler pair.
    #[error("Handler not found: /{unit}/{handler}")]
    NotFound {
        /// Requested unit name
        unit: String,
        /// Requested handler name
        handler: String,
    },

    /// The handler exists but does not accept the requested HTTP method.
    #[error("Method {method} not allowed for /{unit}/{handler}")]
    MethodNotAllowed {
        /// Requested unit name
        unit: String,
        /// Requested handler name
        handler: String,
        /// The rejected method
        method: String,
    },

    /// A foreign-thread submission was attempted while no scheduler was running.
    #[error("Scheduler bridge is not attached to a running scheduler")]
    BridgeUnavailable,

    /// Work was submitted after shutdown began.
    #[error("Reload subsystem is shutting down")]
    ShuttingDown,

    /// A blocking worker task panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    WorkerFailed(String),

    /// Failed to load or merge configuration sources.
    #[error("Failed to load configuration: {0}")]
    Config(String),

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    Validation(String),

    /// File watching failed to initialize or to register a path.
    #[error("File watching error: {0}")]
    Watch(String),

    /// The presented credential does not grant administrative access.
    #[error("Unauthorized: admin token required")]
    Unauthorized,

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReloadError {
    /// Create a load failure for `unit`.
    pub fn load_failure(unit: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::LoadFailure {
            unit: unit.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a not-found error for a unit/handler pair.
    pub fn not_found(unit: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::NotFound {
            unit: unit.into(),
            handler: handler.into(),
        }
    }

    /// Whether this error should be surfaced to a client as "not found"
    /// rather than as a server fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Error returned by a handler invocation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    /// The supplied parameters did not match the handler's declared schema.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The handler itself failed.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Create a handler failure with a message.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<ValidationError> for HandlerError {
    fn from(err: ValidationError) -> Self {
        HandlerError::InvalidParams(err.to_string())
    }
}

/// Validation error for configuration and parameter validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors: `None` when empty, the error itself when
    /// there is exactly one, `Multiple` otherwise.
    pub fn from_list(mut errors: Vec<ValidationError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ReloadError {
    fn from(err: ValidationError) -> Self {
        ReloadError::Validation(err.to_string())
    }
}
