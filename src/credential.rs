//! The single local user and its password hash
//!
//! Exactly one user may be registered per vault directory. The password is
//! stored as an Argon2id PHC string; the vault password itself is never
//! written anywhere.

use crate::error::{ErrorCategory, ErrorKind, KisError, Result};
use crate::secure_fs;
use argon2::Argon2;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_registered(&self) -> bool {
        self.path.exists()
    }

    /// Register the device's only user.
    pub fn register(&self, username: &str, password: &str) -> Result<()> {
        if username.is_empty() {
            return Err(KisError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidInput,
                "username must not be empty",
            ));
        }
        if self.is_registered() {
            return Err(KisError::with_kind(
                ErrorCategory::User,
                ErrorKind::UserExists,
                "a user is already registered on this device",
            ));
        }

        let record = UserRecord {
            username: username.to_owned(),
            password_hash: hash_password(password)?,
        };
        let encoded = serde_json::to_vec_pretty(&record).map_err(|e| {
            KisError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "failed to serialize user record",
                e,
            )
        })?;
        secure_fs::write_file_atomic(&self.path, &encoded)?;
        debug!(path = %self.path.display(), "registered user");
        Ok(())
    }

    pub fn load(&self) -> Result<UserRecord> {
        let data = fs::read(&self.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                KisError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::NoUser,
                    "no registered user found - please run `kis register` first",
                )
            } else {
                KisError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::PersistenceFailed,
                    format!("failed to read from {}", self.path.display()),
                    e,
                )
            }
        })?;

        serde_json::from_slice(&data).map_err(|e| {
            KisError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::CorruptRepository,
                format!("user file {} is corrupt", self.path.display()),
                e,
            )
        })
    }

    /// Check `username` and `password` against the registered user.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        let record = self.load()?;
        if record.username != username {
            return Err(authentication_failed());
        }
        verify_password(&record.password_hash, password)
    }

    /// Check `password` against the registered user, whoever it is.
    pub fn verify(&self, password: &str) -> Result<()> {
        let record = self.load()?;
        verify_password(&record.password_hash, password)
    }

    /// Remove the user after authenticating it.
    pub fn delete(&self, username: &str, password: &str) -> Result<()> {
        self.authenticate(username, password)?;
        secure_fs::remove_file_if_exists(&self.path)?;
        debug!(path = %self.path.display(), "deleted user");
        Ok(())
    }

    /// Remove the registered user, whatever its name, after checking the password.
    pub fn delete_all(&self, password: &str) -> Result<()> {
        let record = self.load()?;
        self.delete(&record.username, password)
    }
}

fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; 16];
    OsRng.try_fill_bytes(&mut salt).map_err(|e| {
        KisError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::RandomSourceExhausted,
            "failed to generate random salt",
            e,
        )
    })?;
    let salt = SaltString::encode_b64(&salt).map_err(hashing_error)?;

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(hashing_error)?;
    Ok(hash.to_string())
}

fn verify_password(phc: &str, password: &str) -> Result<()> {
    let parsed = PasswordHash::new(phc).map_err(|e| {
        KisError::with_kind(
            ErrorCategory::User,
            ErrorKind::CorruptRepository,
            format!("stored password hash is invalid: {}", e),
        )
    })?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(()),
        Err(password_hash::Error::Password) => Err(authentication_failed()),
        Err(e) => Err(hashing_error(e)),
    }
}

fn authentication_failed() -> KisError {
    KisError::with_kind(
        ErrorCategory::User,
        ErrorKind::AuthenticationFailed,
        "invalid username or password",
    )
}

fn hashing_error(err: password_hash::Error) -> KisError {
    KisError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::KeyDerivation,
        format!("password hashing failed: {}", err),
    )
}
