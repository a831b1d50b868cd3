//! Printable encoding of encrypted envelopes
//!
//! An [`EncryptedBlob`] is standard base64 (with padding) of the binary
//! envelope `salt || nonce || ciphertext‖tag`. The blob is self-contained:
//! nothing else needs to be stored to decrypt it other than the password.

use std::fmt;

use crate::error::{ErrorCategory, ErrorKind, KisError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// Opaque, printable encrypted envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedBlob(String);

impl EncryptedBlob {
    /// Encode a binary envelope.
    pub fn encode(body: &[u8]) -> Self {
        Self(STANDARD.encode(body))
    }

    /// Decode back into the binary envelope.
    ///
    /// Only the encoding is checked here; length and authenticity are up to
    /// the cipher.
    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD.decode(&self.0).map_err(|e| {
            KisError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::MalformedBlob,
                "base64 decoding failed",
                e,
            )
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EncryptedBlob {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

impl From<&str> for EncryptedBlob {
    fn from(encoded: &str) -> Self {
        Self(encoded.to_owned())
    }
}

impl fmt::Display for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
