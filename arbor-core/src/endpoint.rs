//! Replaceable handle to the model endpoint
//!
//! The model client is built from the current credential and rebuilt on
//! `reconfigure`. Requests already in flight keep the client they started
//! with; the next request picks up the new one.

use llm::{ChatModel, ClaudeProvider};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::credentials::CredentialStore;
use crate::error::{Error, Result};

pub type SharedModel = Arc<dyn ChatModel + Send + Sync>;

/// Builds a model client from a credential
pub type ModelFactory = Arc<dyn Fn(&str) -> anyhow::Result<SharedModel> + Send + Sync>;

pub struct Endpoint {
    credentials: Arc<dyn CredentialStore>,
    factory: ModelFactory,
    model: RwLock<Option<SharedModel>>,
}

impl Endpoint {
    /// Create the handle and build the first client if a credential exists
    pub fn new(credentials: Arc<dyn CredentialStore>, factory: ModelFactory) -> Self {
        let endpoint = Self {
            credentials,
            factory,
            model: RwLock::new(None),
        };
        if let Err(e) = endpoint.reconfigure() {
            warn!("Endpoint not configured: {}", e);
        }
        endpoint
    }

    /// Claude endpoint for `model_name`, optionally at a non-default base URL
    pub fn claude(
        credentials: Arc<dyn CredentialStore>,
        model_name: &str,
        base_url: Option<&str>,
    ) -> Self {
        let model_name = model_name.to_string();
        let base_url = base_url.unwrap_or(llm::providers::DEFAULT_BASE_URL).to_string();
        let factory: ModelFactory = Arc::new(move |token: &str| {
            let provider = ClaudeProvider::new(&base_url, token)?;
            Ok(Arc::new(provider.create_chat_model(&model_name)) as SharedModel)
        });
        Self::new(credentials, factory)
    }

    /// Rebuild the client from the current credential. A credential the
    /// factory rejects leaves the endpoint unconfigured.
    pub fn reconfigure(&self) -> Result<()> {
        let built = match self.credentials.get_credential() {
            Some(token) => (self.factory)(&token).map_err(Error::endpoint),
            None => Err(Error::Endpoint("no API key configured".into())),
        };
        match built {
            Ok(model) => {
                self.install(Some(model))?;
                info!("Endpoint configured");
                Ok(())
            }
            Err(e) => {
                self.install(None)?;
                Err(e)
            }
        }
    }

    /// Validate a new credential by building a client with it, then store
    /// it and switch to that client. A rejected token changes nothing.
    pub fn set_credential(&self, token: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Err(Error::Endpoint("API key must not be blank".into()));
        }
        let model = (self.factory)(token).map_err(Error::endpoint)?;
        self.credentials.set_credential(token)?;
        self.install(Some(model))?;
        info!("Endpoint configured");
        Ok(())
    }

    fn install(&self, model: Option<SharedModel>) -> Result<()> {
        *self
            .model
            .write()
            .map_err(|_| Error::Endpoint("endpoint lock poisoned".into()))? = model;
        Ok(())
    }

    pub fn has_credential(&self) -> bool {
        self.credentials.get_credential().is_some()
    }

    /// The client to use for the next request
    pub fn current(&self) -> Result<SharedModel> {
        self.model
            .read()
            .map_err(|_| Error::Endpoint("endpoint lock poisoned".into()))?
            .clone()
            .ok_or_else(|| Error::Endpoint("no API key configured".into()))
    }
}
