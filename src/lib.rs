//! kis - Keep it Secret, a local single-user secret vault
//!
//! Secrets are key/value payloads encrypted with a key derived from the
//! master password (scrypt + AES-256-GCM) and stored in a JSON file under
//! the vault directory.

#![forbid(unsafe_code)]

pub mod blob;
pub mod config;
pub mod credential;
pub mod envelope;
pub mod error;
pub mod prompt;
pub mod repository;
pub mod secure_fs;
pub mod vault;

pub use blob::EncryptedBlob;
pub use envelope::{EnvelopeCipher, KdfParams};
pub use error::{ErrorCategory, ErrorKind, KisError, Result};
pub use repository::{SecretRecord, SecretRepository};
