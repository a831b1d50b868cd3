//! Vault commands
//!
//! This module ties the pieces together: it authenticates the operator
//! against the credential store, serializes key/value payloads, encrypts
//! them with the envelope cipher and hands the blobs to the repository.
//! The cipher and the repository never talk to each other directly.

use crate::config::Config;
use crate::credential::CredentialStore;
use crate::envelope::EnvelopeCipher;
use crate::error::{ErrorCategory, ErrorKind, KisError, Result};
use crate::prompt::Prompt;
use crate::repository::SecretRepository;
use std::collections::BTreeMap;
use tracing::{info, warn};

const USERNAME_PROMPT: &str = "Enter username: ";
const PASSWORD_PROMPT: &str = "Enter master password: ";
const CONFIRM_PROMPT: &str = "Confirm password: ";
const KEY_PROMPT: &str = "  Key: ";

/// Decrypted contents of a secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Key/value pairs, as stored by [`Vault::store`].
    Fields(BTreeMap<String, String>),
    /// Plaintext that is not a key/value object, shown as-is.
    Raw(String),
}

impl Payload {
    fn from_plaintext(plaintext: &[u8]) -> Self {
        match serde_json::from_slice::<BTreeMap<String, String>>(plaintext) {
            Ok(fields) => Payload::Fields(fields),
            Err(_) => Payload::Raw(String::from_utf8_lossy(plaintext).into_owned()),
        }
    }
}

pub struct Vault {
    credentials: CredentialStore,
    repository: SecretRepository,
    cipher: EnvelopeCipher,
}

impl Vault {
    /// Open the vault under `config`, creating its directory if needed.
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_with_cipher(config, EnvelopeCipher::default())
    }

    pub fn open_with_cipher(config: &Config, cipher: EnvelopeCipher) -> Result<Self> {
        config.ensure_home()?;
        let repository = SecretRepository::open(config.secrets_path())
            .map_err(|e| e.with_context("failed to open secrets"))?;
        Ok(Self {
            credentials: CredentialStore::new(config.user_path()),
            repository,
            cipher,
        })
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn repository(&self) -> &SecretRepository {
        &self.repository
    }

    /// Register the device's user from prompted username and password.
    /// Returns the username.
    pub fn register(&self, prompt: &mut dyn Prompt) -> Result<String> {
        let username = prompt.read_line(USERNAME_PROMPT)?;
        let password = prompt.read_password(PASSWORD_PROMPT)?;
        let confirm = prompt.read_password(CONFIRM_PROMPT)?;

        if password.is_empty() {
            return Err(invalid_input("password must not be empty"));
        }
        if *password != *confirm {
            return Err(invalid_input("passwords do not match"));
        }

        self.credentials.register(&username, &password)?;
        info!(username = %username, "user registered");
        Ok(username)
    }

    /// Prompt for key/value pairs until an empty key, then for the master
    /// password, and store the result under `name`. Returns the number of
    /// pairs stored.
    pub fn add_secret(&self, name: &str, prompt: &mut dyn Prompt) -> Result<usize> {
        validate_name(name)?;

        let mut fields = BTreeMap::new();
        loop {
            let key = prompt.read_line(KEY_PROMPT)?;
            if key.is_empty() {
                break;
            }
            let value = prompt.read_line(&format!("  Value for '{}': ", key))?;
            fields.insert(key, value);
        }

        if fields.is_empty() {
            return Err(invalid_input("no key/value pairs provided"));
        }

        let password = prompt.read_password(PASSWORD_PROMPT)?;
        self.store(name, &fields, &password)?;
        Ok(fields.len())
    }

    /// Encrypt `fields` under `password` and save them as `name`,
    /// replacing any existing secret of that name.
    pub fn store(
        &self,
        name: &str,
        fields: &BTreeMap<String, String>,
        password: &str,
    ) -> Result<()> {
        validate_name(name)?;
        self.credentials.verify(password)?;

        let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(fields).map_err(|e| {
            KisError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "failed to serialize secret",
                e,
            )
        })?);
        let blob = self
            .cipher
            .encrypt(&plaintext, password)
            .map_err(|e| e.with_context("encryption failed"))?;
        self.repository
            .save(name, blob)
            .map_err(|e| e.with_context(format!("failed to save secret {}", name)))?;

        info!(name = %name, fields = fields.len(), "secret saved");
        Ok(())
    }

    /// Prompt for the master password and decrypt `name`.
    pub fn get_secret(&self, name: &str, prompt: &mut dyn Prompt) -> Result<Payload> {
        let password = prompt.read_password(PASSWORD_PROMPT)?;
        self.reveal(name, &password)
    }

    pub fn reveal(&self, name: &str, password: &str) -> Result<Payload> {
        self.credentials.verify(password)?;

        let blob = self.repository.get(name)?;
        let plaintext = zeroize::Zeroizing::new(
            self.cipher
                .decrypt(&blob, password)
                .map_err(|e| e.with_context(format!("failed to decrypt {}", name)))?,
        );
        Ok(Payload::from_plaintext(&plaintext))
    }

    /// Sorted names of all stored secrets.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.repository.list()?.into_iter().collect())
    }

    pub fn delete_secret(&self, name: &str) -> Result<()> {
        self.repository.delete(name)?;
        info!(name = %name, "secret deleted");
        Ok(())
    }

    pub fn clear_secrets(&self) -> Result<()> {
        self.repository.clear_all()?;
        warn!("all secrets deleted");
        Ok(())
    }

    /// Delete `username` after prompting for its password.
    pub fn delete_user(&self, username: &str, prompt: &mut dyn Prompt) -> Result<()> {
        let password = prompt.read_password(PASSWORD_PROMPT)?;
        self.credentials.delete(username, &password)?;
        info!(username = %username, "user deleted");
        Ok(())
    }

    /// Delete whichever user is registered after prompting for its password.
    pub fn delete_all_users(&self, prompt: &mut dyn Prompt) -> Result<()> {
        let password = prompt.read_password(PASSWORD_PROMPT)?;
        self.credentials.delete_all(&password)?;
        warn!("all users deleted");
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid_input("secret name must not be empty"));
    }
    Ok(())
}

fn invalid_input(msg: &str) -> KisError {
    KisError::with_kind(ErrorCategory::User, ErrorKind::InvalidInput, msg)
}
