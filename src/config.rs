//! Where the vault lives on disk

use crate::error::{ErrorCategory, ErrorKind, KisError, Result};
use crate::secure_fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the vault directory.
pub const HOME_ENV: &str = "KIS_HOME";

const DEFAULT_DIR_NAME: &str = ".kis";
const SECRETS_FILE: &str = "secrets.json";
const USER_FILE: &str = "user.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    home: PathBuf,
}

impl Config {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Use `home` if given (from `--home` or `KIS_HOME`), otherwise
    /// `~/.kis`.
    pub fn resolve(home: Option<PathBuf>) -> Result<Self> {
        if let Some(home) = home {
            return Ok(Self::new(home));
        }
        let user_home = dirs::home_dir().ok_or_else(|| {
            KisError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidInput,
                format!(
                    "cannot determine home directory; pass --home or set {}",
                    HOME_ENV
                ),
            )
        })?;
        Ok(Self::new(user_home.join(DEFAULT_DIR_NAME)))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.home.join(SECRETS_FILE)
    }

    pub fn user_path(&self) -> PathBuf {
        self.home.join(USER_FILE)
    }

    /// Create the vault directory, owner-only.
    pub fn ensure_home(&self) -> Result<()> {
        secure_fs::create_private_dir(&self.home)
    }
}
