use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// Use of Internal is never a guarantee the error is not, for example,
    /// caused by the operator - merely that it cannot be confidently
    /// determined by the code.
    Internal,

    /// The operator provided invalid input or asked for something that is
    /// impossible to complete (unknown secret, wrong password, ...).
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The operating system random source could not supply bytes.
    RandomSourceExhausted,
    /// Key derivation or password hashing failed, or its parameters are invalid.
    KeyDerivation,
    /// An encrypted blob could not be decoded or is too short to hold a
    /// salt and nonce.
    MalformedBlob,
    /// Authenticated decryption failed due to an incorrect password or
    /// tampering or corruption.
    DecryptionFailed,
    /// No secret is stored under the requested name.
    NotFound,
    /// Reading, writing, renaming or removing a durable file failed.
    PersistenceFailed,
    /// A durable file exists but its contents cannot be parsed.
    CorruptRepository,
    /// No user has been registered on this device.
    NoUser,
    /// A user is already registered on this device.
    UserExists,
    /// The username or password did not match the registered credential.
    AuthenticationFailed,
    /// Operator input was rejected (empty name, empty payload, ...).
    InvalidInput,
    /// Input could not be obtained from the configured prompt.
    PromptUnavailable,
    /// Unexpected state reached within kis logic.
    InternalInvariant,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct KisError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl KisError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// True if the error is tagged with `kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == Some(kind)
    }

    /// Wraps the current error with a higher-level message while preserving
    /// the original as source. Category and kind carry over.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, KisError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn test_context_keeps_kind_and_category() {
        let err = KisError::with_kind(ErrorCategory::User, ErrorKind::NotFound, "secret not found")
            .with_context("failed to read secret");

        assert_eq!(err.message(), "failed to read secret");
        assert_eq!(err.category, ErrorCategory::User);
        assert!(err.is(ErrorKind::NotFound));

        let inner = err.source().expect("context preserves source");
        assert_eq!(inner.to_string(), "secret not found");
    }

    #[test]
    fn test_source_is_exposed() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = KisError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::PersistenceFailed,
            "failed to write secrets file",
            io_err,
        );

        assert_eq!(err.to_string(), "failed to write secrets file");
        assert_eq!(
            err.source().map(|s| s.to_string()).as_deref(),
            Some("denied")
        );
    }

    #[test]
    fn test_untagged_error() {
        let err = KisError::new(ErrorCategory::Internal, "something odd");
        assert_eq!(err.kind, None);
        assert!(!err.is(ErrorKind::InternalInvariant));
    }
}
