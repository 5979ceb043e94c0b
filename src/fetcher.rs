//! Envelope-returning client for ad-hoc calls against one base URL.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Method;
use serde_json::Value;
use tracing::{error, info};

use crate::cache::ResponseCache;
use crate::cancel::CancelSignal;
use crate::client::{CallOptions, ClientInner, Flavor};
use crate::errors::Error;
use crate::hooks::{ErrorHook, Hook};
use crate::request::{Query, RequestBody, RequestSpec};
use crate::token::{MemoryStore, TokenManager, TokenStore};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{Headers, ResponseBody, ResponseEnvelope};

const FETCHER_KEY: &str = "fetch";
const TOKEN_STORAGE_KEY: &str = "x-token";

pub type SuccessHandler = Arc<dyn Fn(ResponseEnvelope) + Send + Sync>;
pub type LoginPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type TokenExtractor = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Per-call result handlers. A handler that is set receives the outcome
/// instead of the caller.
#[derive(Clone, Default)]
pub struct Handlers {
    pub on_success: Option<SuccessHandler>,
    pub on_error: Option<ErrorHook>,
    /// Runs instead of `on_error` when the call was cancelled. Only one of
    /// the two fires; without `on_abort` a cancelled call goes to `on_error`.
    pub on_abort: Option<Hook>,
}

impl Handlers {
    pub fn on_success(mut self, handler: impl Fn(ResponseEnvelope) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(handler));
        self
    }

    pub fn on_error(mut self, handler: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Runs in place of `on_error` for cancelled calls.
    pub fn on_abort(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_abort = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_abort", &self.on_abort.is_some())
            .finish()
    }
}

/// Descriptor form of a [`Fetcher`] call. A bare path converts into a GET.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub url: String,
    pub params: Query,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub handlers: Handlers,
    pub custom_cache: bool,
    pub log: bool,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            url: String::new(),
            params: Query::default(),
            method: Method::GET,
            headers: Vec::new(),
            body: None,
            handlers: Handlers::default(),
            custom_cache: true,
            log: false,
        }
    }
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push(key, value);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn handlers(mut self, handlers: Handlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn custom_cache(mut self, enabled: bool) -> Self {
        self.custom_cache = enabled;
        self
    }

    pub fn log(mut self, enabled: bool) -> Self {
        self.log = enabled;
        self
    }

    fn into_parts(self) -> (RequestSpec, Handlers) {
        let spec = RequestSpec {
            method: self.method,
            url: self.url,
            query: self.params,
            headers: self.headers,
            body: self.body,
            use_cache: self.custom_cache,
            log: self.log,
        };
        (spec, self.handlers)
    }
}

impl From<&str> for FetchRequest {
    fn from(url: &str) -> Self {
        FetchRequest::new(url)
    }
}

impl From<String> for FetchRequest {
    fn from(url: String) -> Self {
        FetchRequest::new(url)
    }
}

/// Decides whether a successful JSON body is a login response and pulls the
/// token out of it. Only consulted while no token is held.
#[derive(Clone)]
pub struct LoginResponseHook {
    predicate: LoginPredicate,
    extractor: TokenExtractor,
}

impl LoginResponseHook {
    pub fn new(
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
        extractor: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            predicate: Arc::new(predicate),
            extractor: Arc::new(extractor),
        }
    }

    fn token_from(&self, body: &Value) -> Option<String> {
        if !(self.predicate)(body) {
            return None;
        }
        (self.extractor)(body).filter(|token| !token.is_empty())
    }
}

/// Matches bodies with a `token` or `accesToken` field (historic spelling).
///
/// The extractor is looser than the predicate: it reads `token`, then
/// `accessToken`, then `accesToken`, and skips empty strings. A matched body
/// with no usable value leaves the client without a token rather than
/// storing an empty one.
impl Default for LoginResponseHook {
    fn default() -> Self {
        Self::new(
            |body| {
                body.as_object()
                    .is_some_and(|fields| fields.contains_key("token") || fields.contains_key("accesToken"))
            },
            |body| {
                ["token", "accessToken", "accesToken"]
                    .iter()
                    .filter_map(|field| body.get(*field).and_then(Value::as_str))
                    .find(|token| !token.is_empty())
                    .map(str::to_string)
            },
        )
    }
}

/// Client returning `{data, error, info}` envelopes.
///
/// Successful GETs are cached by resolved URL unless the call opts out.
/// Errors never escape: they go to the call's handlers or come back as an
/// error envelope or `None`.
#[derive(Clone)]
pub struct Fetcher {
    inner: Arc<ClientInner>,
    login: Arc<RwLock<LoginResponseHook>>,
}

impl Fetcher {
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(ReqwestTransport::new()),
            Arc::new(MemoryStore::new()),
        )
    }

    pub fn with_parts(transport: Arc<dyn Transport>, store: Arc<dyn TokenStore>) -> Self {
        let token = Arc::new(TokenManager::new(FETCHER_KEY, TOKEN_STORAGE_KEY, store));
        let inner = ClientInner::new(
            FETCHER_KEY,
            Flavor::Simple,
            Headers::new(),
            token,
            transport,
            Arc::new(CancelSignal::new()),
        );
        Self {
            inner: Arc::new(inner),
            login: Arc::new(RwLock::new(LoginResponseHook::default())),
        }
    }

    pub fn set_base_url(&self, url: impl Into<String>) {
        self.inner.state.write().url_api = url.into();
    }

    pub fn base_url(&self) -> String {
        self.inner.state.read().url_api.clone()
    }

    /// Sets the bearer token without persisting it.
    pub fn set_auth_token(&self, token: impl Into<String>) {
        self.inner.token.set(Some(token.into()));
    }

    pub fn clear_auth_token(&self) {
        self.inner.token.set(None);
    }

    pub fn auth_token(&self) -> Option<String> {
        self.inner.token.current()
    }

    pub fn on_login_response(
        &self,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
        extractor: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) {
        *self.login.write() = LoginResponseHook::new(predicate, extractor);
    }

    /// Aborts every request currently in flight; later requests are unaffected.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    pub async fn fetch(&self, request: impl Into<FetchRequest>) -> Option<ResponseEnvelope> {
        let (spec, handlers) = request.into().into_parts();
        let log = spec.log;

        match self.inner.execute(&spec, &CallOptions::default()).await {
            Ok(exchange) => {
                if !exchange.from_cache {
                    self.adopt_login_token(&exchange.envelope);
                }
                if log {
                    info!(
                        "fetch ok: status={} url='{}' cached={}",
                        exchange.envelope.info.status,
                        exchange.envelope.info.url,
                        exchange.from_cache
                    );
                }
                match handlers.on_success {
                    Some(handler) => {
                        handler(exchange.envelope);
                        None
                    }
                    None => Some(exchange.envelope),
                }
            }
            Err(Error::Status(envelope)) => match handlers.on_error {
                Some(handler) => {
                    handler(&Error::Status(envelope));
                    None
                }
                None => Some(*envelope),
            },
            Err(Error::EmptyUrl) => {
                error!("URL not provided!");
                None
            }
            Err(err) => {
                error!("fetch failed: url='{}' error={}", spec.url, err);
                match (err.is_cancelled(), handlers.on_abort, handlers.on_error) {
                    (true, Some(on_abort), _) => on_abort(),
                    (_, _, Some(on_error)) => on_error(&err),
                    _ => {}
                }
                None
            }
        }
    }

    pub async fn get(&self, request: impl Into<FetchRequest>) -> Option<ResponseEnvelope> {
        self.fetch(request.into().method(Method::GET)).await
    }

    pub async fn post(
        &self,
        request: impl Into<FetchRequest>,
        body: Option<Value>,
    ) -> Option<ResponseEnvelope> {
        self.fetch(with_body(request.into().method(Method::POST), body))
            .await
    }

    /// PUT.
    pub async fn update(
        &self,
        request: impl Into<FetchRequest>,
        body: Option<Value>,
    ) -> Option<ResponseEnvelope> {
        self.fetch(with_body(request.into().method(Method::PUT), body))
            .await
    }

    /// DELETE.
    pub async fn remove(&self, request: impl Into<FetchRequest>) -> Option<ResponseEnvelope> {
        self.fetch(request.into().method(Method::DELETE)).await
    }

    fn adopt_login_token(&self, envelope: &ResponseEnvelope) {
        if self.inner.token.current().is_some() {
            return;
        }
        let Some(ResponseBody::Json(body)) = &envelope.data else {
            return;
        };
        let token = self.login.read().token_from(body);
        if let Some(token) = token {
            info!("auth token adopted from login response: url='{}'", envelope.info.url);
            self.inner.token.adopt(&token);
        }
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn with_body(request: FetchRequest, body: Option<Value>) -> FetchRequest {
    match body {
        Some(body) => request.body(body),
        None => request,
    }
}
