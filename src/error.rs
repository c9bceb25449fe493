use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthzError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown variable {0}")]
    UnknownVariable(String),

    #[error("Unknown {operator} expectation: {expected}")]
    UnknownConditionExpectation { operator: String, expected: String },

    #[error("Unknown condition operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid resource name: {0} (expected lrn:<realm>:<system>:...)")]
    InvalidResourceName(String),

    #[error("Attribute nesting exceeds {0} levels")]
    FlattenDepthExceeded(usize),

    #[error("Malformed statement: {0}")]
    MalformedStatement(String),

    #[error("Policy store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Policy store returned a malformed record: {0}")]
    StoreMalformed(String),

    #[error("Access Denied: {reason}")]
    AccessDenied { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthzError {
    pub fn access_denied(reason: impl Into<String>) -> Self {
        AuthzError::AccessDenied {
            reason: reason.into(),
        }
    }

    /// True for the routine outcome of a failed authorization.
    ///
    /// Every other variant signals misconfiguration or an infrastructure
    /// failure and must not be treated as a policy decision.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, AuthzError::AccessDenied { .. })
    }
}

pub type Result<T> = std::result::Result<T, AuthzError>;
