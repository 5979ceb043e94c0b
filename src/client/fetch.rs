//! Request orchestration: build, cache check, send, 401 recovery, shaping.

use std::sync::Arc;

use futures::FutureExt;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::Error;
use crate::request::{self, Defaults, RequestSpec, ResolvedRequest};
use crate::token::{Flight, RefreshOutcome};
use crate::types::ResponseEnvelope;

use super::{CallOptions, ClientInner};

/// A shaped envelope plus where it came from.
pub(crate) struct Exchange {
    pub(crate) envelope: ResponseEnvelope,
    pub(crate) from_cache: bool,
}

impl ClientInner {
    /// Runs one external call to completion.
    ///
    /// A 401 triggers at most one refresh-and-replay; the replay resends the
    /// same spec, so non-idempotent methods repeat their side effects.
    pub(crate) async fn execute(
        &self,
        spec: &RequestSpec,
        call: &CallOptions,
    ) -> Result<Exchange, Error> {
        let cancel = self.cancel.token();
        let mut replayed = false;
        loop {
            let sent_with = self.token.current();
            let request = self.build(spec, call, sent_with.as_deref())?;

            if request.cacheable()
                && let Some(envelope) = self.cache.get(&request.url)
            {
                if request.log {
                    info!("cache hit: url='{}'", request.url);
                }
                return Ok(Exchange {
                    envelope,
                    from_cache: true,
                });
            }

            if request.log {
                info!(
                    method = %request.method,
                    url = %request.url,
                    headers = ?request.headers,
                    replay = replayed,
                    "fetch.request"
                );
            }
            let response = self.transport.send(&request, &cancel).await?;
            let status = response.status;
            let info = response.info();

            if self.flavor.is_success(status) {
                let envelope = ResponseEnvelope::success(response.body, info);
                self.remember(&request, &envelope);
                return Ok(Exchange {
                    envelope,
                    from_cache: false,
                });
            }

            if status == StatusCode::UNAUTHORIZED {
                match self.refresh_url(call) {
                    Some(refresh_url) if !replayed => {
                        warn!(
                            "401 unauthorized: key='{}' url='{}'; refreshing token",
                            self.key, request.url
                        );
                        self.recover(refresh_url, call, sent_with, &cancel).await?;
                        replayed = true;
                        continue;
                    }
                    _ => warn!(
                        "401 unauthorized: key='{}' url='{}' replayed={}",
                        self.key, request.url, replayed
                    ),
                }
            }

            let envelope = ResponseEnvelope::failure(response.body, info);
            if request.log {
                info!(
                    "request failed: status={} url='{}'",
                    envelope.info.status, envelope.info.url
                );
            }
            return Err(Error::Status(Box::new(envelope)));
        }
    }

    fn build(
        &self,
        spec: &RequestSpec,
        call: &CallOptions,
        bearer: Option<&str>,
    ) -> Result<ResolvedRequest, Error> {
        let state = self.state.read();
        let base_url = call.url_api.as_deref().unwrap_or(&state.url_api);
        request::resolve(
            spec,
            &Defaults {
                base_url,
                headers: &state.headers,
                bearer,
            },
        )
    }

    fn remember(&self, request: &ResolvedRequest, envelope: &ResponseEnvelope) {
        if !request.cacheable() {
            return;
        }
        self.cache.set(request.url.clone(), envelope.clone());
        if request.log {
            info!(
                "cached response: url='{}' entries={}",
                request.url,
                self.cache.len()
            );
        }
    }

    fn refresh_url(&self, call: &CallOptions) -> Option<String> {
        let url = match &call.url_refresh {
            Some(url) => url.clone(),
            None => self.state.read().url_refresh.clone(),
        };
        (!url.is_empty()).then_some(url)
    }

    /// Refreshes the token or waits on the refresh already running.
    async fn recover(
        &self,
        refresh_url: String,
        call: &CallOptions,
        sent_with: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let (headers, wait) = {
            let state = self.state.read();
            let headers =
                request::compose_headers(&state.headers, self.token.current().as_deref(), &[]);
            (headers, state.refresh_wait)
        };

        let flight = self.flight.begin(
            || self.token.current() != sent_with,
            || {
                let token = Arc::clone(&self.token);
                let transport = Arc::clone(&self.transport);
                let cancel = cancel.clone();
                async move {
                    match token
                        .refresh(transport.as_ref(), &refresh_url, headers, &cancel)
                        .await
                    {
                        Ok(true) => RefreshOutcome::Refreshed,
                        Ok(false) => RefreshOutcome::Rejected,
                        Err(err) => RefreshOutcome::Faulted(Arc::new(err)),
                    }
                }
                .boxed()
            },
        );

        let (id, pending, leading) = match flight {
            Flight::AlreadyRefreshed => {
                debug!("token already refreshed: key='{}'", self.key);
                return Ok(());
            }
            Flight::Lead(id, pending) => (id, pending, true),
            Flight::Join(id, pending) => {
                debug!("waiting on in-flight refresh: key='{}'", self.key);
                (id, pending, false)
            }
        };

        let outcome = match wait {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    // Evict the hung refresh so the next 401 starts a new one.
                    self.flight.abandon(id);
                    warn!(
                        "token refresh timed out: key='{}' limit={:?}",
                        self.key, limit
                    );
                    return Err(Error::Timeout(limit));
                }
            },
            None => pending.await,
        };

        match outcome {
            RefreshOutcome::Refreshed => Ok(()),
            RefreshOutcome::Rejected => {
                if leading
                    && let Some(hook) = call
                        .on_error_refresh
                        .pick(self.hooks().on_error_refresh.as_ref())
                {
                    hook();
                }
                Err(Error::AuthExpired)
            }
            RefreshOutcome::Faulted(err) => Err(Error::RefreshFaulted(err)),
        }
    }
}
