//! Request building: base URL join, query merge, header defaults and body encoding.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Error;
use crate::types::Headers;

pub const CONTENT_TYPE: &str = "content-type";
pub const AUTHORIZATION: &str = "authorization";
pub const JSON_MIME: &str = "application/json";

// Escapes of URI-reserved characters survive decoding, like `decodeURI`.
static RESERVED_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)%(?:2[346BCF]|3[ABDF]|40)").expect("reserved escape pattern is valid")
});

/// Ordered query parameters; values are scalars rendered verbatim.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query(Vec<(String, Value)>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Outgoing body before encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// Serialized to a JSON string when the content type is JSON.
    Json(Value),
    /// Passed through untouched, e.g. a pre-encoded multipart payload.
    Raw(Vec<u8>),
}

impl RequestBody {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        Ok(RequestBody::Json(serde_json::to_value(value)?))
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Raw(bytes)
    }
}

/// Caller-facing description of one request, before defaults are applied.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub query: Query,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub use_cache: bool,
    pub log: bool,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            method: Method::GET,
            url: String::new(),
            query: Query::default(),
            headers: Vec::new(),
            body: None,
            use_cache: false,
            log: false,
        }
    }
}

/// Fully resolved request handed to the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub use_cache: bool,
    pub log: bool,
}

impl ResolvedRequest {
    /// Only GET requests with caching enabled touch the response cache.
    pub fn cacheable(&self) -> bool {
        self.method == Method::GET && self.use_cache
    }
}

/// Instance-level inputs merged into every request.
pub struct Defaults<'a> {
    pub base_url: &'a str,
    pub headers: &'a Headers,
    pub bearer: Option<&'a str>,
}

pub fn resolve(spec: &RequestSpec, defaults: &Defaults<'_>) -> Result<ResolvedRequest, Error> {
    let joined = join_url(defaults.base_url, &spec.url);
    let url = decode_url(&append_query(joined, &spec.query));
    if url.is_empty() {
        return Err(Error::EmptyUrl);
    }

    let headers = compose_headers(defaults.headers, defaults.bearer, &spec.headers);
    let body = match &spec.body {
        Some(body) => Some(encode_body(body, &headers)?),
        None => None,
    };
    if body.is_none() && (spec.method == Method::POST || spec.method == Method::PUT) {
        warn!("body not provided: method={} url='{}'", spec.method, url);
    }

    Ok(ResolvedRequest {
        method: spec.method.clone(),
        url,
        headers,
        body,
        use_cache: spec.use_cache,
        log: spec.log,
    })
}

/// Joins a base URL and a path, inserting `/` unless the path starts with `/` or `?`.
pub fn join_url(base: &str, path: &str) -> String {
    if base.is_empty() {
        return path.to_string();
    }
    if path.is_empty() {
        return base.to_string();
    }
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (true, false) | (false, true) => format!("{base}{path}"),
        (false, false) if path.starts_with('?') => format!("{base}{path}"),
        (false, false) => format!("{base}/{path}"),
    }
}

/// Appends `&key=value` per parameter, then turns the first `&` of the whole
/// string into `?`, even when the URL already carried a query.
pub fn append_query(mut url: String, query: &Query) -> String {
    if query.is_empty() {
        return url;
    }
    for (key, value) in query.iter() {
        url.push('&');
        url.push_str(key);
        url.push('=');
        url.push_str(&render_scalar(value));
    }
    url.replacen('&', "?", 1)
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_scalar)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Decodes percent-escapes, leaving escapes of reserved characters intact.
pub fn decode_url(url: &str) -> String {
    let mut decoded = String::with_capacity(url.len());
    let mut last = 0;
    for reserved in RESERVED_ESCAPE.find_iter(url) {
        decoded.push_str(&decode_segment(&url[last..reserved.start()]));
        decoded.push_str(reserved.as_str());
        last = reserved.end();
    }
    decoded.push_str(&decode_segment(&url[last..]));
    decoded
}

fn decode_segment(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(text) => text.into_owned(),
        Err(err) => {
            debug!("url segment left encoded: {}", err);
            segment.to_string()
        }
    }
}

/// Default `Content-Type: application/json`, then instance headers, then the
/// bearer token, then per-call headers.
pub fn compose_headers(
    instance: &Headers,
    bearer: Option<&str>,
    overrides: &[(String, String)],
) -> Headers {
    let mut headers = Headers::new();
    headers.insert(CONTENT_TYPE.to_string(), JSON_MIME.to_string());
    for (name, value) in instance {
        headers.insert(name.to_ascii_lowercase(), value.clone());
    }
    if let Some(token) = bearer.filter(|t| !t.is_empty()) {
        headers.insert(AUTHORIZATION.to_string(), format!("Bearer {token}"));
    }
    for (name, value) in overrides {
        headers.insert(name.to_ascii_lowercase(), value.clone());
    }
    headers
}

fn encode_body(body: &RequestBody, headers: &Headers) -> Result<Vec<u8>, Error> {
    let json_content = headers
        .get(CONTENT_TYPE)
        .map(|ct| is_json_mime(ct))
        .unwrap_or(false);
    match body {
        RequestBody::Raw(bytes) => Ok(bytes.clone()),
        RequestBody::Json(Value::String(text)) if !json_content => Ok(text.clone().into_bytes()),
        RequestBody::Json(value) => Ok(serde_json::to_vec(value)?),
    }
}

fn is_json_mime(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(JSON_MIME))
        .unwrap_or(false)
}
