//! The single-exchange HTTP seam.
//!
//! The orchestrator only talks to [`Transport`]; [`ReqwestTransport`] is the
//! default implementation. Cancellation is cooperative: implementations must
//! watch the supplied token and stop promptly with [`Error::Cancelled`].

mod decode;
mod http;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::errors::Error;
use crate::request::ResolvedRequest;
use crate::types::{Headers, ResponseBody, ResponseInfo};

pub use decode::{decode_body, extract_error_message};
pub use http::ReqwestTransport;

/// Raw outcome of one exchange, body already decoded.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: Headers,
    pub url: String,
    pub body: ResponseBody,
}

impl TransportResponse {
    pub fn info(&self) -> ResponseInfo {
        ResponseInfo {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            url: self.url.clone(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &ResolvedRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse, Error>;
}
