//! Lifecycle callbacks attached to a client instance or a single call.

use std::fmt;
use std::sync::Arc;

use crate::errors::Error;

pub type Hook = Arc<dyn Fn() + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Instance-level callbacks.
#[derive(Clone, Default)]
pub struct Hooks {
    /// Runs once per external call, before the first send.
    pub pre_fetch: Option<Hook>,
    /// Runs once per external call after it terminates, whatever the branch.
    pub post_fetch: Option<Hook>,
    /// Receives HTTP error statuses and transport faults.
    pub on_error_response: Option<ErrorHook>,
    /// Runs when a 401 could not be recovered because the refresh was rejected.
    pub on_error_refresh: Option<Hook>,
}

impl Hooks {
    pub fn pre_fetch(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.pre_fetch = Some(Arc::new(hook));
        self
    }

    pub fn post_fetch(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.post_fetch = Some(Arc::new(hook));
        self
    }

    pub fn on_error_response(mut self, hook: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error_response = Some(Arc::new(hook));
        self
    }

    pub fn on_error_refresh(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_error_refresh = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_fetch", &self.pre_fetch.is_some())
            .field("post_fetch", &self.post_fetch.is_some())
            .field("on_error_response", &self.on_error_response.is_some())
            .field("on_error_refresh", &self.on_error_refresh.is_some())
            .finish()
    }
}

/// Per-call choice for one instance hook.
#[derive(Clone)]
pub enum Override<T> {
    /// Use the instance hook.
    Inherit,
    /// Run nothing for this call.
    Disabled,
    /// Run this hook instead of the instance hook.
    Replace(T),
}

impl<T> Default for Override<T> {
    fn default() -> Self {
        Override::Inherit
    }
}

impl<T: Clone> Override<T> {
    pub(crate) fn pick(&self, instance: Option<&T>) -> Option<T> {
        match self {
            Override::Inherit => instance.cloned(),
            Override::Disabled => None,
            Override::Replace(hook) => Some(hook.clone()),
        }
    }
}

impl<T> fmt::Debug for Override<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Override::Inherit => write!(f, "Inherit"),
            Override::Disabled => write!(f, "Disabled"),
            Override::Replace(_) => write!(f, "Replace(..)"),
        }
    }
}

/// Runs the post-fetch hook when dropped, so it fires exactly once on every exit path.
pub(crate) struct PostFetchGuard(Option<Hook>);

impl PostFetchGuard {
    pub(crate) fn new(hook: Option<Hook>) -> Self {
        Self(hook)
    }
}

impl Drop for PostFetchGuard {
    fn drop(&mut self) {
        if let Some(hook) = self.0.take() {
            hook();
        }
    }
}
