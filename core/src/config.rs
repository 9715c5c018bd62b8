//! Connection profile for an Erply account.

use std::fmt;
use std::time::Duration;

use crate::error::ApiError;

pub const ENV_URL: &str = "ERPLY_URL";
pub const ENV_CLIENT_CODE: &str = "ERPLY_CLIENT_CODE";
pub const ENV_USERNAME: &str = "ERPLY_USERNAME";
pub const ENV_PASSWORD: &str = "ERPLY_PASSWORD";
pub const ENV_CONNECT_TIMEOUT: &str = "ERPLY_CONNECT_TIMEOUT_SECS";
pub const ENV_EXECUTION_TIMEOUT: &str = "ERPLY_EXECUTION_TIMEOUT_SECS";

/// Immutable connection profile. Build with `ClientConfig::builder()`.
///
/// A config without a URL is valid to build; `ApiClient::send` rejects it
/// before doing any I/O.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    url: Option<String>,
    client_code: Option<String>,
    username: Option<String>,
    password: Option<String>,
    connection_timeout: Option<Duration>,
    execution_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Read the profile from `ERPLY_*` environment variables.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like `from_env`, with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(url) = lookup(ENV_URL) {
            builder = builder.url(&url);
        }
        if let Some(code) = lookup(ENV_CLIENT_CODE) {
            builder = builder.client_code(code);
        }
        if let Some(username) = lookup(ENV_USERNAME) {
            builder = builder.username(username);
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            builder = builder.password(password);
        }
        if let Some(secs) = lookup(ENV_CONNECT_TIMEOUT) {
            builder = builder.connection_timeout(parse_secs(ENV_CONNECT_TIMEOUT, &secs)?);
        }
        if let Some(secs) = lookup(ENV_EXECUTION_TIMEOUT) {
            builder = builder.execution_timeout(parse_secs(ENV_EXECUTION_TIMEOUT, &secs)?);
        }
        Ok(builder.build())
    }

    /// Endpoint URL, always ending in `/`.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn client_code(&self) -> Option<&str> {
        self.client_code.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        self.connection_timeout
    }

    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("client_code", &self.client_code)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connection_timeout", &self.connection_timeout)
            .field("execution_timeout", &self.execution_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the endpoint, e.g. `https://123456.erply.com/api/`. The trailing
    /// slash is required by the API and appended when missing.
    pub fn url(mut self, url: &str) -> Self {
        self.config.url = normalize_url(url);
        self
    }

    /// Erply account number.
    pub fn client_code(mut self, client_code: impl Into<String>) -> Self {
        self.config.client_code = Some(client_code.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = Some(timeout);
        self
    }

    /// Limit for the whole exchange. Raise it if large calls time out.
    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.config.execution_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

fn normalize_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    if url.ends_with('/') {
        Some(url.to_string())
    } else {
        Some(format!("{url}/"))
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration, ApiError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ApiError::Configuration(format!("{name} must be whole seconds, got {value:?}")))
}
