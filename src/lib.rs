//! Async HTTP client runtime: base-URL request building, a GET response
//! cache, bearer-token auth with single-flight refresh on 401, and
//! cooperative cancellation.
//!
//! [`Registry`] hands out named [`RestClient`] instances that unwrap a
//! `payload` field from JSON responses. [`Fetcher`] is the lighter variant
//! returning whole [`ResponseEnvelope`]s.

mod cache;
mod cancel;
mod client;
mod config;
mod errors;
mod fetcher;
mod hooks;
mod registry;
pub mod request;
pub mod telemetry;
pub mod token;
pub mod transport;
mod types;

pub use cache::ResponseCache;
pub use cancel::CancelSignal;
pub use client::{CallOptions, RestClient};
pub use config::ClientOptions;
pub use errors::{Error, TransportFault};
pub use fetcher::{FetchRequest, Fetcher, Handlers, LoginResponseHook, SuccessHandler};
pub use hooks::{ErrorHook, Hook, Hooks, Override};
pub use registry::Registry;
pub use request::{Query, RequestBody, RequestSpec, ResolvedRequest};
pub use types::{Headers, ResponseBody, ResponseEnvelope, ResponseInfo};
