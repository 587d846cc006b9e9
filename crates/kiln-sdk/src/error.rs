//! Error types crossing the native/script boundary

/// Result type for bridge and runtime operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors raised into scripts.
///
/// Every variant is delivered to the script as a runtime error carrying the
/// `Display` message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// Argument or self value has the wrong (or no) type tag
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name or tag
        expected: String,
        /// Actual type name or tag
        actual: String,
    },

    /// Handle's reference is null or has been released
    #[error("Invalid reference: nullptr access")]
    InvalidReference,

    /// Malformed input
    #[error("Argument error: {0}")]
    Argument(String),

    /// Value has no structured-document representation
    #[error("Not document-castable: {0}")]
    NotDocumentCastable(String),

    /// A native operation failed
    #[error("Native operation failed: {0}")]
    NativeOperation(String),

    /// Raised by the runtime itself (bad call target, stale reference, ...)
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl BridgeError {
    /// Shorthand for a type mismatch
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        BridgeError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::NativeOperation(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::NativeOperation(s.to_string())
    }
}
