//! External identity providers.
//!
//! Third-party login is consumed through the `ExternalAuth` capability; the
//! provider's identity is linked to a local user by (provider, subject).

pub mod pending;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::shared::error::Result;

pub use pending::{PendingAuthorization, PendingAuthorizations};

/// Identity asserted by an external provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: String,
    /// Stable identifier at the provider
    pub subject: String,
    pub claims: BTreeMap<String, String>,
}

#[async_trait]
pub trait ExternalAuth: Send + Sync {
    /// Registered provider name
    fn name(&self) -> &str;

    /// Where to send the browser to start a login. `state` must come back
    /// unchanged on the callback.
    fn challenge_url(&self, state: &str, callback_uri: &str) -> String;

    /// Turn callback parameters into a verified identity
    async fn authenticate(&self, callback_params: &HashMap<String, String>) -> Result<ExternalIdentity>;
}

#[derive(Clone, Default)]
pub struct ExternalProviders {
    providers: HashMap<String, Arc<dyn ExternalAuth>>,
}

impl ExternalProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn ExternalAuth>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExternalAuth>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
