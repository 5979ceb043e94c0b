use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

use crate::types::ResponseEnvelope;

/// Boxed error produced by a transport implementation.
pub type TransportFault = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug)]
pub enum Error {
    /// No URL could be resolved from the base URL, path and parameters.
    EmptyUrl,
    /// The transport failed before a response was received.
    Transport(TransportFault),
    /// The server answered with an error status; the decoded body is in `error`.
    Status(Box<ResponseEnvelope>),
    /// A 401 could not be recovered because the token refresh was rejected.
    AuthExpired,
    /// The refresh endpoint answered with something other than 200.
    RefreshFailed(StatusCode),
    /// The refresh exchange itself faulted (network, decoding).
    RefreshFaulted(Arc<Error>),
    Cancelled,
    Timeout(Duration),
    Json(serde_json::Error),
    Io(std::io::Error),
    Config(String),
    Decode(String),
}

impl Error {
    /// Returns the HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status(envelope) => Some(envelope.info.status),
            Error::RefreshFailed(status) => Some(*status),
            Error::AuthExpired => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    /// Returns the error envelope for `Status` errors.
    pub fn envelope(&self) -> Option<&ResponseEnvelope> {
        match self {
            Error::Status(envelope) => Some(envelope),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::RefreshFaulted(inner) => inner.is_cancelled(),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyUrl => write!(f, "URL not provided"),
            Error::Transport(err) => write!(f, "transport error: {err}"),
            Error::Status(envelope) => write!(
                f,
                "request to '{}' failed with status {}",
                envelope.info.url, envelope.info.status
            ),
            Error::AuthExpired => write!(f, "authorization expired (401) and token refresh failed"),
            Error::RefreshFailed(status) => {
                write!(f, "token refresh rejected with status {status}")
            }
            Error::RefreshFaulted(err) => write!(f, "token refresh faulted: {err}"),
            Error::Cancelled => write!(f, "request cancelled"),
            Error::Timeout(limit) => write!(f, "timed out after {limit:?}"),
            Error::Json(err) => write!(f, "json error: {err}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(err) => Some(err.as_ref()),
            Error::RefreshFaulted(err) => Some(err.as_ref()),
            Error::Json(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(Box::new(err))
    }
}
