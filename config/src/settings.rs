//! Application settings management

use crate::crypto;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Model used when the settings file does not name one
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";

/// Output bound sent with every request unless overridden
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Application settings stored in settings.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Model name passed to the provider (e.g., "claude-3-5-sonnet-20240620")
    pub default_model: Option<String>,
    /// Upper bound on generated tokens per response
    pub max_tokens: Option<u32>,
    /// Override for the provider base URL (proxies, test servers)
    pub base_url: Option<String>,
    /// Encrypted API keys (provider name -> encrypted key)
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl Settings {
    /// Load settings from an explicit path; a missing or unreadable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };

        toml::from_str(&content).unwrap_or_default()
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))?;
        Ok(())
    }

    pub fn model(&self) -> &str {
        self.default_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// Get a decrypted API key for a provider.
    /// Returns None if not set or decryption fails.
    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys
            .get(provider)
            .and_then(|encrypted| crypto::decrypt_string(encrypted).ok())
    }

    /// Set an API key for a provider (encrypts before storing).
    pub fn set_api_key(&mut self, provider: &str, api_key: &str) -> Result<(), String> {
        let encrypted = crypto::encrypt_string(api_key)?;
        self.api_keys.insert(provider.to_string(), encrypted);
        Ok(())
    }

    pub fn remove_api_key(&mut self, provider: &str) {
        self.api_keys.remove(provider);
    }

    /// Check if a non-blank API key is stored for a provider.
    pub fn has_api_key(&self, provider: &str) -> bool {
        self.get_api_key(provider)
            .is_some_and(|key| !key.trim().is_empty())
    }
}
