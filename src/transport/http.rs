use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::Error;
use crate::request::ResolvedRequest;
use crate::types::Headers;

use super::{Transport, TransportResponse, decode_body};

const USER_AGENT: &str = concat!("restfetch/", env!("CARGO_PKG_VERSION"));

/// [`Transport`] backed by a shared `reqwest::Client`.
///
/// No timeouts are applied here; pass a preconfigured client through
/// [`ReqwestTransport::with_client`] to set them.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn exchange(&self, request: &ResolvedRequest) -> Result<TransportResponse, Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .header("User-Agent", USER_AGENT);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let url = resp.url().to_string();
        let headers: Headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let content_type = headers.get(CONTENT_TYPE.as_str()).cloned();
        let bytes = resp.bytes().await?;
        debug!(
            "response received: status={} url='{}' bytes={}",
            status,
            url,
            bytes.len()
        );

        Ok(TransportResponse {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            url,
            body: decode_body(content_type.as_deref(), bytes.to_vec())?,
        })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &ResolvedRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse, Error> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("request cancelled: url='{}'", request.url);
                Err(Error::Cancelled)
            }
            result = self.exchange(request) => result,
        }
    }
}
