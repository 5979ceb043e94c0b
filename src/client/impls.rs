use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, warn};

use crate::errors::Error;
use crate::hooks::PostFetchGuard;
use crate::request::{Query, RequestBody, RequestSpec};
use crate::types::{ResponseBody, ResponseEnvelope};

use super::{CallOptions, RestClient};

impl RestClient {
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: Option<&Query>,
        options: Option<&CallOptions>,
    ) -> Option<T> {
        self.request(Method::GET, endpoint, None, query, options)
            .await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<Value>,
        query: Option<&Query>,
        options: Option<&CallOptions>,
    ) -> Option<T> {
        self.request(Method::POST, endpoint, body.map(RequestBody::Json), query, options)
            .await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<Value>,
        query: Option<&Query>,
        options: Option<&CallOptions>,
    ) -> Option<T> {
        self.request(Method::PUT, endpoint, body.map(RequestBody::Json), query, options)
            .await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<Value>,
        query: Option<&Query>,
        options: Option<&CallOptions>,
    ) -> Option<T> {
        self.request(Method::PATCH, endpoint, body.map(RequestBody::Json), query, options)
            .await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<Value>,
        query: Option<&Query>,
        options: Option<&CallOptions>,
    ) -> Option<T> {
        self.request(Method::DELETE, endpoint, body.map(RequestBody::Json), query, options)
            .await
    }

    /// Sends one request and returns the unwrapped payload.
    ///
    /// A body carrying a truthy `meta` field is returned whole; otherwise its
    /// `payload` field is returned. Every failure is reported through the
    /// error hooks and yields `None`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<RequestBody>,
        query: Option<&Query>,
        options: Option<&CallOptions>,
    ) -> Option<T> {
        let fallback = CallOptions::default();
        let call = options.unwrap_or(&fallback);
        let hooks = self.inner.hooks();

        let _post_fetch = PostFetchGuard::new(call.post_fetch.pick(hooks.post_fetch.as_ref()));
        if let Some(pre_fetch) = call.pre_fetch.pick(hooks.pre_fetch.as_ref()) {
            pre_fetch();
        }

        let spec = RequestSpec {
            method,
            url: endpoint.to_string(),
            query: query.cloned().unwrap_or_default(),
            headers: call.headers.clone(),
            body,
            use_cache: call.use_cache,
            log: call.log,
        };

        let result = self
            .inner
            .execute(&spec, call)
            .await
            .and_then(|exchange| unwrap_payload(exchange.envelope));
        match result {
            Ok(value) => Some(value),
            // The refresh hook has already run for the caller that led the refresh.
            Err(Error::AuthExpired) => None,
            Err(Error::EmptyUrl) => {
                error!("URL not provided: key='{}' endpoint='{}'", self.key(), endpoint);
                None
            }
            Err(err) => {
                match call
                    .on_error_response
                    .pick(hooks.on_error_response.as_ref())
                {
                    Some(hook) => hook(&err),
                    None => warn!(
                        "request failed: key='{}' endpoint='{}' error={}",
                        self.key(),
                        endpoint,
                        err
                    ),
                }
                None
            }
        }
    }
}

fn unwrap_payload<T: DeserializeOwned>(envelope: ResponseEnvelope) -> Result<T, Error> {
    let url = envelope.info.url;
    let body = envelope
        .data
        .and_then(ResponseBody::into_json)
        .ok_or_else(|| Error::Decode(format!("expected a JSON body from '{url}'")))?;

    let value = if body.get("meta").is_some_and(truthy) {
        body
    } else {
        match body {
            Value::Object(mut fields) => fields.remove("payload").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    };
    Ok(serde_json::from_value(value)?)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::types::ResponseInfo;

    fn envelope(body: Value) -> ResponseEnvelope {
        ResponseEnvelope::success(
            ResponseBody::Json(body),
            ResponseInfo {
                status: StatusCode::OK,
                status_text: "OK".into(),
                headers: BTreeMap::new(),
                url: "https://x/posts".into(),
            },
        )
    }

    #[test]
    fn payload_field_is_unwrapped() {
        let value: Value = unwrap_payload(envelope(json!({"payload": {"id": 1}}))).unwrap();
        assert_eq!(value, json!({"id": 1}));
    }

    #[test]
    fn meta_bodies_are_returned_whole() {
        let body = json!({"meta": {"total": 2}, "payload": [1, 2]});
        let value: Value = unwrap_payload(envelope(body.clone())).unwrap();
        assert_eq!(value, body);
    }

    #[test]
    fn falsy_meta_still_unwraps() {
        let value: Value = unwrap_payload(envelope(json!({"meta": null, "payload": 7}))).unwrap();
        assert_eq!(value, json!(7));
    }

    #[test]
    fn missing_payload_is_null() {
        let value: Option<u32> = unwrap_payload(envelope(json!({"other": 1}))).unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn non_json_body_is_a_decode_error() {
        let mut env = envelope(Value::Null);
        env.data = Some(ResponseBody::Text("plain".into()));
        let err = unwrap_payload::<Value>(env).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
