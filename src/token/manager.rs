use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::Error;
use crate::request::ResolvedRequest;
use crate::telemetry::refresh::RefreshTelemetry;
use crate::transport::Transport;
use crate::types::{Headers, ResponseBody};

use super::TokenStore;

const EVENT_CAPACITY: usize = 16;

/// Fired once per refresh resolution, scoped to one instance key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshEvent {
    pub key: String,
    pub success: bool,
}

#[derive(Deserialize)]
struct RefreshResponse {
    payload: RefreshPayload,
}

#[derive(Deserialize)]
struct RefreshPayload {
    token: String,
}

/// Holds the bearer token of one instance and performs refresh exchanges.
///
/// The manager does not serialize refreshes itself; see
/// [`RefreshFlight`](super::RefreshFlight) for that.
pub struct TokenManager {
    key: String,
    storage_key: String,
    token: RwLock<Option<String>>,
    store: Arc<dyn TokenStore>,
    events: broadcast::Sender<RefreshEvent>,
}

impl TokenManager {
    pub fn new(
        key: impl Into<String>,
        storage_key: impl Into<String>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            key: key.into(),
            storage_key: storage_key.into(),
            token: RwLock::new(None),
            store,
            events,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn current(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Replaces the in-memory token without persisting it.
    pub fn set(&self, token: Option<String>) {
        *self.token.write() = token.filter(|t| !t.is_empty());
    }

    /// Replaces the token and persists it under the storage key.
    pub fn adopt(&self, token: &str) {
        self.set(Some(token.to_string()));
        if let Err(err) = self.store.set_string(&self.storage_key, token) {
            warn!(
                "token persist failed: key='{}' error={}",
                self.storage_key, err
            );
        }
    }

    /// Loads a persisted token when none is held. Returns whether one was found.
    pub fn restore(&self) -> bool {
        if self.token.read().is_some() {
            return false;
        }
        match self.store.get_string(&self.storage_key) {
            Some(token) if !token.is_empty() => {
                info!("token restored from storage: key='{}'", self.storage_key);
                self.set(Some(token));
                true
            }
            _ => false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    /// POSTs to the refresh endpoint with the given headers.
    ///
    /// Returns `Ok(true)` when a new token was adopted, `Ok(false)` when the
    /// endpoint answered with anything but 200. Transport faults and malformed
    /// 200 bodies are returned as errors.
    pub async fn refresh(
        &self,
        transport: &dyn Transport,
        refresh_url: &str,
        headers: Headers,
        cancel: &CancellationToken,
    ) -> Result<bool, Error> {
        let telemetry = RefreshTelemetry::new(self.key.as_str(), refresh_url);
        telemetry.emit_start();

        let request = ResolvedRequest {
            method: Method::POST,
            url: refresh_url.to_string(),
            headers,
            body: None,
            use_cache: false,
            log: false,
        };
        let outcome = match transport.send(&request, cancel).await {
            Ok(response) if response.status == StatusCode::OK => {
                extract_token(response.body).map(Some)
            }
            Ok(response) => {
                telemetry.emit_failure(&Error::RefreshFailed(response.status));
                Ok(None)
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(Some(token)) => {
                self.adopt(&token);
                telemetry.emit_success();
                self.announce(true);
                Ok(true)
            }
            Ok(None) => {
                self.announce(false);
                Ok(false)
            }
            Err(err) => {
                telemetry.emit_failure(&err);
                self.announce(false);
                Err(err)
            }
        }
    }

    fn announce(&self, success: bool) {
        // No subscribers is fine.
        let _ = self.events.send(RefreshEvent {
            key: self.key.clone(),
            success,
        });
    }
}

fn extract_token(body: ResponseBody) -> Result<String, Error> {
    let value = body
        .into_json()
        .ok_or_else(|| Error::Decode("refresh response is not JSON".into()))?;
    let parsed: RefreshResponse = serde_json::from_value(value)?;
    Ok(parsed.payload.token)
}
