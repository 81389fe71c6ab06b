//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use std::fmt;
use std::time::Duration;
use taskmirror_protocol::ResourceKind;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default sync endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.todoist.com/api/v1/sync";

/// Bearer token for the sync endpoint.
///
/// The token is zeroized when dropped and never printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wraps a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    ///
    /// Don't log or persist the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true if the token is blank.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(****)")
    }
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Sync endpoint URL.
    pub endpoint: String,
    /// Bearer token.
    pub token: ApiToken,
    /// Resource kinds mirrored by a full refresh.
    pub resources: Vec<ResourceKind>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User-Agent header value.
    pub user_agent: String,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration for the default endpoint.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: ApiToken::new(token),
            resources: ResourceKind::ALL.to_vec(),
            timeout: Duration::from_secs(15),
            user_agent: format!("taskmirror/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the mirrored resource kinds.
    pub fn with_resources(mut self, resources: impl IntoIterator<Item = ResourceKind>) -> Self {
        self.resources = resources.into_iter().collect();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the User-Agent header value.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Checks that the configuration can be used to talk to a server.
    pub fn validate(&self) -> SyncResult<()> {
        if self.token.is_empty() {
            return Err(SyncError::InvalidRequest("API token is empty".into()));
        }
        if self.endpoint.trim().is_empty() {
            return Err(SyncError::InvalidRequest("sync endpoint is empty".into()));
        }
        if self.resources.is_empty() {
            return Err(SyncError::InvalidRequest(
                "at least one resource kind is required".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per request (at least 1).
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Calculates the delay after the given failed attempt (1-indexed).
    ///
    /// Attempt 0 has no delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        // NaN or negative products come from a bad multiplier.
        let max_secs = self.max_delay.as_secs_f64();
        let delay_secs = if base_delay.is_nan() {
            max_secs
        } else {
            base_delay.clamp(0.0, max_secs)
        };

        let delay_secs = if self.add_jitter {
            delay_secs + delay_secs * 0.25 * fastrand::f64()
        } else {
            delay_secs
        };
        Duration::try_from_secs_f64(delay_secs).unwrap_or(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
