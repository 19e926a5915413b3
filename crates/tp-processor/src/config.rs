//! Processor configuration.

use std::env;
use std::time::Duration;
use tp_channel::{parse_endpoint, DEFAULT_MAX_FRAME_SIZE};
use tp_dispatch::DEFAULT_REQUEST_TIMEOUT;
use tp_types::HeaderStyle;
use tracing::warn;

/// Smallest frame limit accepted; below this even registration does not fit.
const MIN_FRAME_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Validator endpoint, `tcp://host:port` or `host:port`.
    pub endpoint: String,
    /// Header style requested at registration.
    pub header_style: HeaderStyle,
    /// Default wait for replies to sub-requests and registration.
    pub request_timeout: Duration,
    /// Wait for the unregister acknowledgement on shutdown.
    pub unregister_timeout: Duration,
    /// Upper bound on concurrently executing transactions.
    pub max_concurrent_requests: usize,
    /// Largest frame accepted from or written to the channel.
    pub max_frame_size: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            endpoint: "tcp://localhost:4004".to_string(),
            header_style: HeaderStyle::Expanded,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            unregister_timeout: Duration::from_secs(5),
            max_concurrent_requests: 64,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ProcessorConfig {
    /// Defaults overridden by environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TP_CONNECT`: validator endpoint (default: tcp://localhost:4004)
    /// - `TP_HEADER_STYLE`: `expanded` or `raw` (default: expanded)
    /// - `TP_REQUEST_TIMEOUT_MS`: sub-request timeout (default: 30000)
    /// - `TP_MAX_CONCURRENCY`: concurrent transactions (default: 64)
    /// - `TP_MAX_FRAME_SIZE`: frame limit in bytes (default: 16 MiB)
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("TP_CONNECT") {
            config.endpoint = endpoint;
        }
        if let Some(style) = parse_var(&lookup, "TP_HEADER_STYLE") {
            config.header_style = style;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TP_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, "TP_MAX_CONCURRENCY") {
            config.max_concurrent_requests = n;
        }
        if let Some(n) = parse_var(&lookup, "TP_MAX_FRAME_SIZE") {
            config.max_frame_size = n;
        }
        config
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_header_style(mut self, header_style: HeaderStyle) -> Self {
        self.header_style = header_style;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_unregister_timeout(mut self, timeout: Duration) -> Self {
        self.unregister_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_endpoint(&self.endpoint)
            .map_err(|_| ConfigError::InvalidEndpoint(self.endpoint.clone()))?;

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request_timeout cannot be 0".into(),
            ));
        }
        if self.unregister_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "unregister_timeout cannot be 0".into(),
            ));
        }

        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_concurrent_requests cannot be 0".into(),
            ));
        }
        if u32::try_from(self.max_concurrent_requests).is_err() {
            return Err(ConfigError::InvalidLimit(format!(
                "max_concurrent_requests cannot exceed {}",
                u32::MAX
            )));
        }
        if self.max_frame_size < MIN_FRAME_SIZE {
            return Err(ConfigError::InvalidLimit(format!(
                "max_frame_size must be at least {} bytes",
                MIN_FRAME_SIZE
            )));
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = key, value = %raw, "Ignoring unparseable environment value");
            None
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid endpoint '{0}' (expected tcp://host:port or host:port)")]
    InvalidEndpoint(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid limit: {0}")]
    InvalidLimit(String),
}
