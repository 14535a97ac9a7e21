use std::{str::FromStr, time::Duration};

use crate::{AnalyticsError, AuthStrategy, Result};

/// Configures the backend address, timeout, retry and auth behavior.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientOptions {
    /// Base address every endpoint is appended to.
    pub base_url: String,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub retry_delay_ms: u64,
    /// Factor applied to the delay for each further retry.
    pub retry_multiplier: f64,
    /// How requests are authenticated.
    pub auth_strategy: AuthStrategy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: 60_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            retry_multiplier: 2.0,
            auth_strategy: AuthStrategy::Jwt,
        }
    }
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Reads options from environment variables.
    ///
    /// Reads:
    /// - `ANALYTICS_API_URL`: base address (required)
    /// - `ANALYTICS_TIMEOUT_MS`, `ANALYTICS_MAX_RETRIES`,
    ///   `ANALYTICS_RETRY_DELAY_MS`, `ANALYTICS_RETRY_MULTIPLIER`
    /// - `ANALYTICS_AUTH_STRATEGY`: `jwt`, `twa` or `none`
    ///
    /// Unset optional variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("ANALYTICS_API_URL").map_err(|_| {
            AnalyticsError::Config("missing ANALYTICS_API_URL environment variable".to_owned())
        })?;
        if base_url.trim().is_empty() {
            return Err(AnalyticsError::Config(
                "ANALYTICS_API_URL is set but empty".to_owned(),
            ));
        }

        let mut opts = Self::new(base_url.trim());
        if let Some(value) = env_value("ANALYTICS_TIMEOUT_MS")? {
            opts.timeout_ms = value;
        }
        if let Some(value) = env_value("ANALYTICS_MAX_RETRIES")? {
            opts.max_retries = value;
        }
        if let Some(value) = env_value("ANALYTICS_RETRY_DELAY_MS")? {
            opts.retry_delay_ms = value;
        }
        if let Some(value) = env_value("ANALYTICS_RETRY_MULTIPLIER")? {
            opts.retry_multiplier = value;
        }
        if let Some(value) = env_value("ANALYTICS_AUTH_STRATEGY")? {
            opts.auth_strategy = value;
        }
        opts.validate()?;
        Ok(opts)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_retry_multiplier(mut self, retry_multiplier: f64) -> Self {
        self.retry_multiplier = retry_multiplier;
        self
    }

    pub fn with_auth_strategy(mut self, auth_strategy: AuthStrategy) -> Self {
        self.auth_strategy = auth_strategy;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Rejects values the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(AnalyticsError::Config("base_url must not be empty".to_owned()));
        }
        url::Url::parse(&self.base_url).map_err(|err| {
            AnalyticsError::Config(format!("invalid base_url '{}': {err}", self.base_url))
        })?;
        if self.timeout_ms == 0 {
            return Err(AnalyticsError::Config("timeout_ms must be positive".to_owned()));
        }
        if !self.retry_multiplier.is_finite() || self.retry_multiplier < 1.0 {
            return Err(AnalyticsError::Config(format!(
                "retry_multiplier must be a finite value >= 1, got {}",
                self.retry_multiplier
            )));
        }
        Ok(())
    }
}

fn env_value<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| AnalyticsError::Config(format!("invalid {name} '{raw}': {err}"))),
        _ => Ok(None),
    }
}
