//! Instance configuration, read from values, a JSON file, or the environment.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::Error;
use crate::hooks::Hooks;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClientOptions {
    #[serde(default)]
    pub url_api: String,
    #[serde(default)]
    pub url_refresh: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Upper bound in milliseconds on waiting for a token refresh; unset
    /// waits indefinitely.
    #[serde(default)]
    pub refresh_wait_ms: Option<u64>,
    #[serde(skip)]
    pub hooks: Hooks,
}

impl ClientOptions {
    pub fn from_values(
        url_api: impl Into<String>,
        url_refresh: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            url_api: url_api.into(),
            url_refresh: url_refresh.into(),
            token,
            refresh_wait_ms: None,
            hooks: Hooks::default(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let options: ClientOptions = serde_json::from_str(&contents)?;
        options.validate()?;
        Ok(options)
    }

    /// Reads `RESTFETCH_URL_API`, `RESTFETCH_URL_REFRESH`, and optionally
    /// `RESTFETCH_TOKEN` and `RESTFETCH_REFRESH_WAIT_MS`.
    pub fn from_env() -> Result<Self, Error> {
        let refresh_wait_ms = match std::env::var("RESTFETCH_REFRESH_WAIT_MS") {
            Ok(raw) => Some(raw.parse::<u64>().map_err(|e| {
                Error::Config(format!(
                    "Invalid RESTFETCH_REFRESH_WAIT_MS '{}': {}",
                    raw, e
                ))
            })?),
            Err(_) => None,
        };
        let options = Self {
            url_api: std::env::var("RESTFETCH_URL_API")
                .map_err(|_| Error::Config("Missing RESTFETCH_URL_API env var".to_string()))?,
            url_refresh: std::env::var("RESTFETCH_URL_REFRESH")
                .map_err(|_| Error::Config("Missing RESTFETCH_URL_REFRESH env var".to_string()))?,
            token: std::env::var("RESTFETCH_TOKEN").ok(),
            refresh_wait_ms,
            hooks: Hooks::default(),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sub-millisecond remainders round up, so only a zero limit stays zero.
    pub fn with_refresh_wait(mut self, limit: Duration) -> Self {
        let millis = limit.as_nanos().div_ceil(1_000_000);
        self.refresh_wait_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    pub fn refresh_wait(&self) -> Option<Duration> {
        self.refresh_wait_ms.map(Duration::from_millis)
    }

    /// A non-empty base URL must be absolute.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.url_api.is_empty() {
            reqwest::Url::parse(&self.url_api).map_err(|e| {
                Error::Config(format!("Invalid url_api '{}': {}", self.url_api, e))
            })?;
        }
        if self.refresh_wait_ms == Some(0) {
            return Err(Error::Config(
                "refresh_wait_ms must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_config_parses_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(
            &path,
            r#"{"url_api":"https://x/","url_refresh":"https://x/refresh","token":"t0","refresh_wait_ms":5000}"#,
        )
        .unwrap();

        let options = ClientOptions::from_file(&path).unwrap();
        assert_eq!(options.url_api, "https://x/");
        assert_eq!(options.token.as_deref(), Some("t0"));
        assert_eq!(options.refresh_wait(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let options = ClientOptions::from_values("not a url", "", None);
        match options.validate() {
            Err(Error::Config(msg)) => assert!(msg.contains("Invalid url_api")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn zero_refresh_wait_is_rejected() {
        let options = ClientOptions::from_values("https://x", "", None)
            .with_refresh_wait(Duration::from_secs(0));
        assert!(matches!(options.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn sub_second_refresh_wait_is_kept() {
        let options = ClientOptions::from_values("https://x", "", None)
            .with_refresh_wait(Duration::from_millis(500));
        assert_eq!(options.refresh_wait(), Some(Duration::from_millis(500)));
        assert!(options.validate().is_ok());

        let tiny = ClientOptions::from_values("https://x", "", None)
            .with_refresh_wait(Duration::from_micros(1));
        assert_eq!(tiny.refresh_wait(), Some(Duration::from_millis(1)));
    }
}
