use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde_json::Value;

/// Header map keyed by lower-cased header name.
pub type Headers = BTreeMap<String, String>;

/// Response body decoded according to its content type.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Raw(Vec<u8>),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Transport-level facts about a response.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseInfo {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: Headers,
    /// Final URL after redirects.
    pub url: String,
}

/// Shaped result of a single exchange. On the simple client exactly one of
/// `data` / `error` is set.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseEnvelope {
    pub data: Option<ResponseBody>,
    pub error: Option<ResponseBody>,
    pub info: ResponseInfo,
}

impl ResponseEnvelope {
    pub fn success(data: ResponseBody, info: ResponseInfo) -> Self {
        Self {
            data: Some(data),
            error: None,
            info,
        }
    }

    pub fn failure(error: ResponseBody, info: ResponseInfo) -> Self {
        Self {
            data: None,
            error: Some(error),
            info,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
