use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::ResponseEnvelope;

/// Last successful GET response per resolved URL.
///
/// Entries never expire and are never invalidated by writes to the same
/// resource; callers that need fresh data disable caching on the call.
#[derive(Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, ResponseEnvelope>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<ResponseEnvelope> {
        self.entries.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: ResponseEnvelope) {
        self.entries.write().insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
