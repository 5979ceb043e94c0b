use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info};

use crate::cancel::CancelSignal;
use crate::client::RestClient;
use crate::config::ClientOptions;
use crate::errors::Error;
use crate::token::{MemoryStore, TokenStore};
use crate::transport::{ReqwestTransport, Transport};

/// Named client instances sharing one transport, token store and
/// cancellation signal.
///
/// Entries are created on first use and never removed. Passing options for a
/// key that already exists reconfigures that instance in place, so every
/// handle obtained earlier observes the change.
pub struct Registry {
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    cancel: Arc<CancelSignal>,
    instances: Mutex<HashMap<String, RestClient>>,
}

impl Registry {
    /// Registry using `reqwest` and an in-memory token store.
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(ReqwestTransport::new()),
            Arc::new(MemoryStore::new()),
        )
    }

    pub fn with_parts(transport: Arc<dyn Transport>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            transport,
            store,
            cancel: Arc::new(CancelSignal::new()),
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, key: &str, options: Option<ClientOptions>) -> RestClient {
        let mut instances = self.instances.lock();
        if let Some(existing) = instances.get(key) {
            if let Some(options) = options
                && let Err(err) = existing.reconfigure(options)
            {
                error!("client options ignored: key='{}' error={}", key, err);
            }
            return existing.clone();
        }

        let client = RestClient::create(
            key,
            options,
            Arc::clone(&self.transport),
            Arc::clone(&self.store),
            Arc::clone(&self.cancel),
        );
        instances.insert(key.to_string(), client.clone());
        info!("client registered: key='{}'", key);
        client
    }

    pub fn get(&self, key: &str) -> Option<RestClient> {
        self.instances.lock().get(key).cloned()
    }

    /// Reconfigures an existing instance. Fails for unknown keys and for
    /// invalid options, which leave the instance unchanged.
    pub fn reconfigure(&self, key: &str, options: ClientOptions) -> Result<RestClient, Error> {
        let client = self
            .get(key)
            .ok_or_else(|| Error::Config(format!("no client registered under '{key}'")))?;
        client.reconfigure(options)?;
        Ok(client)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.instances.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Aborts every in-flight request of every instance in this registry.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
