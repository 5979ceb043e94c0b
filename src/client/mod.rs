use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::StatusCode;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::cache::ResponseCache;
use crate::cancel::CancelSignal;
use crate::config::ClientOptions;
use crate::errors::Error;
use crate::hooks::{ErrorHook, Hook, Hooks, Override};
use crate::token::{RefreshEvent, RefreshFlight, TokenManager, TokenStore};
use crate::transport::Transport;
use crate::types::{Headers, ResponseEnvelope};

mod fetch;
mod impls;

/// Which statuses count as success, and thus get shaped and cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flavor {
    /// Anything below 400.
    Typed,
    /// 2xx only.
    Simple,
}

impl Flavor {
    fn is_success(self, status: StatusCode) -> bool {
        match self {
            Flavor::Typed => status.as_u16() < 400,
            Flavor::Simple => status.is_success(),
        }
    }
}

/// Mutable per-instance configuration; replaced in place on reconfigure.
pub(crate) struct InstanceState {
    pub(crate) url_api: String,
    pub(crate) url_refresh: String,
    pub(crate) headers: Headers,
    pub(crate) hooks: Hooks,
    pub(crate) refresh_wait: Option<Duration>,
}

pub(crate) struct ClientInner {
    pub(crate) key: String,
    pub(crate) flavor: Flavor,
    pub(crate) state: RwLock<InstanceState>,
    pub(crate) token: Arc<TokenManager>,
    pub(crate) flight: Arc<RefreshFlight>,
    pub(crate) cache: ResponseCache,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cancel: Arc<CancelSignal>,
}

impl ClientInner {
    pub(crate) fn new(
        key: &str,
        flavor: Flavor,
        headers: Headers,
        token: Arc<TokenManager>,
        transport: Arc<dyn Transport>,
        cancel: Arc<CancelSignal>,
    ) -> Self {
        Self {
            key: key.to_string(),
            flavor,
            state: RwLock::new(InstanceState {
                url_api: String::new(),
                url_refresh: String::new(),
                headers,
                hooks: Hooks::default(),
                refresh_wait: None,
            }),
            token,
            flight: RefreshFlight::new(),
            cache: ResponseCache::new(),
            transport,
            cancel,
        }
    }

    pub(crate) fn hooks(&self) -> Hooks {
        self.state.read().hooks.clone()
    }
}

/// Per-call overrides for [`RestClient`] requests.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    pub url_api: Option<String>,
    pub url_refresh: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Serve GETs from, and store them in, the instance cache.
    pub use_cache: bool,
    pub log: bool,
    pub pre_fetch: Override<Hook>,
    pub post_fetch: Override<Hook>,
    pub on_error_response: Override<ErrorHook>,
    pub on_error_refresh: Override<Hook>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url_api(mut self, url: impl Into<String>) -> Self {
        self.url_api = Some(url.into());
        self
    }

    pub fn url_refresh(mut self, url: impl Into<String>) -> Self {
        self.url_refresh = Some(url.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    pub fn log(mut self, enabled: bool) -> Self {
        self.log = enabled;
        self
    }

    pub fn pre_fetch(mut self, hook: Override<Hook>) -> Self {
        self.pre_fetch = hook;
        self
    }

    pub fn post_fetch(mut self, hook: Override<Hook>) -> Self {
        self.post_fetch = hook;
        self
    }

    pub fn on_error_response(mut self, hook: Override<ErrorHook>) -> Self {
        self.on_error_response = hook;
        self
    }

    pub fn on_error_refresh(mut self, hook: Override<Hook>) -> Self {
        self.on_error_refresh = hook;
        self
    }
}

/// Typed client bound to one registry key.
///
/// Clones share the same instance; configuration changes made through any
/// handle are visible to all of them.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<ClientInner>,
}

impl RestClient {
    pub(crate) fn create(
        key: &str,
        options: Option<ClientOptions>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
        cancel: Arc<CancelSignal>,
    ) -> Self {
        let token = Arc::new(TokenManager::new(key, format!("{key}_token"), store));
        let mut headers = Headers::new();
        headers.insert("accept".to_string(), "application/json".to_string());
        let client = Self {
            inner: Arc::new(ClientInner::new(
                key,
                Flavor::Typed,
                headers,
                token,
                transport,
                cancel,
            )),
        };
        if let Some(options) = options
            && let Err(err) = client.reconfigure(options)
        {
            error!("client created unconfigured: key='{}' error={}", key, err);
        }
        client.inner.token.restore();
        client
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// True when both handles point at the same instance.
    pub fn ptr_eq(&self, other: &RestClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Overwrites base URL, refresh URL, wait bound and hooks in place. The
    /// token is replaced only when the options carry one.
    ///
    /// Invalid options are rejected and leave the instance unchanged.
    pub fn reconfigure(&self, options: ClientOptions) -> Result<(), Error> {
        if let Err(err) = options.validate() {
            warn!("client options rejected: key='{}' error={}", self.inner.key, err);
            return Err(err);
        }
        let refresh_wait = options.refresh_wait();
        {
            let mut state = self.inner.state.write();
            state.url_api = options.url_api;
            state.url_refresh = options.url_refresh;
            state.hooks = options.hooks;
            state.refresh_wait = refresh_wait;
        }
        if let Some(token) = options.token {
            self.inner.token.set(Some(token));
        }
        info!(
            "client configured: key='{}' url_api='{}'",
            self.inner.key,
            self.inner.state.read().url_api
        );
        Ok(())
    }

    pub fn url_api(&self) -> String {
        self.inner.state.read().url_api.clone()
    }

    pub fn url_refresh(&self) -> String {
        self.inner.state.read().url_refresh.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.token.current()
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.inner.flight.in_flight()
    }

    pub fn subscribe_refresh(&self) -> broadcast::Receiver<RefreshEvent> {
        self.inner.token.subscribe()
    }

    /// Cached envelope for a fully resolved URL.
    pub fn cached(&self, url: &str) -> Option<ResponseEnvelope> {
        self.inner.cache.get(url)
    }

    pub fn cache_len(&self) -> usize {
        self.inner.cache.len()
    }
}
