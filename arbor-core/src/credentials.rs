//! Where the endpoint credential comes from
//!
//! The settings-file store keeps the key encrypted in `settings.toml`; the
//! memory store exists for tests and ephemeral sessions.

use config::Settings;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Settings key under which the Claude credential is stored
pub const CLAUDE_PROVIDER: &str = "claude";

/// Environment variable consulted when no key is stored
pub const API_KEY_ENV: &str = "CLAUDE_API_KEY";

pub trait CredentialStore: Send + Sync {
    /// The configured credential, if any. Blank values count as absent.
    fn get_credential(&self) -> Option<String>;

    fn set_credential(&self, token: &str) -> Result<()>;
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Credential stored encrypted in a settings file
pub struct SettingsCredentials {
    path: PathBuf,
    provider: String,
}

impl SettingsCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            provider: CLAUDE_PROVIDER.to_string(),
        }
    }
}

impl CredentialStore for SettingsCredentials {
    fn get_credential(&self) -> Option<String> {
        let stored = Settings::load_from(&self.path)
            .get_api_key(&self.provider)
            .and_then(non_blank);
        if stored.is_some() {
            return stored;
        }
        debug!("No stored {} key, checking {}", self.provider, API_KEY_ENV);
        std::env::var(API_KEY_ENV).ok().and_then(non_blank)
    }

    fn set_credential(&self, token: &str) -> Result<()> {
        let mut settings = Settings::load_from(&self.path);
        settings
            .set_api_key(&self.provider, token)
            .map_err(Error::Storage)?;
        settings.save_to(&self.path).map_err(Error::Storage)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentials {
    token: Mutex<Option<String>>,
}

impl MemoryCredentials {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: Mutex::new(token.map(str::to_string)),
        }
    }
}

impl CredentialStore for MemoryCredentials {
    fn get_credential(&self) -> Option<String> {
        self.token
            .lock()
            .ok()
            .and_then(|token| token.clone())
            .and_then(non_blank)
    }

    fn set_credential(&self, token: &str) -> Result<()> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| Error::Storage("credential lock poisoned".into()))?;
        *slot = Some(token.to_string());
        Ok(())
    }
}
