//! Key source configuration and validation.

// crates.io
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::_prelude::*;

/// Default size guard (1 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 1_048_576;
/// Default per-request timeout for key document fetches.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Smallest accepted per-request timeout.
pub const MIN_FETCH_TIMEOUT: Duration = Duration::from_millis(100);
/// Default window past expiry during which stale keys may be served on refresh failure.
pub const DEFAULT_STALE_WHILE_ERROR: Duration = Duration::from_secs(60);
/// Longest accepted stale window.
pub const MAX_STALE_WHILE_ERROR: Duration = Duration::from_secs(24 * 60 * 60);

/// What the cache holds after a refresh attempt fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshFailurePolicy {
	/// Clear the snapshot before fetching; a failed refresh leaves the cache empty and returns the
	/// error even when keys were cached before.
	#[default]
	Clear,
	/// Keep the previous non-empty snapshot and return it when the refresh fails, for at most
	/// [`KeySourceConfig::stale_while_error`] past its expiry. Its expiry is left untouched, so
	/// every later call retries the fetch; once the window has passed the error is returned.
	ServeStale,
}

/// Describes where to fetch the key document from and how to treat the result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeySourceConfig {
	/// URL of the JSON document mapping key ids to PEM certificates.
	pub key_url: Url,
	/// Whether HTTPS is required for key retrieval.
	#[serde(default = "default_true")]
	pub require_https: bool,
	/// Maximum size allowed for the key document in bytes.
	#[serde(default = "default_max_response_bytes")]
	pub max_response_bytes: u64,
	/// Timeout applied to each HTTP request.
	#[serde(default = "default_fetch_timeout")]
	pub fetch_timeout: Duration,
	/// Behaviour when a refresh fails.
	#[serde(default)]
	pub failure_policy: RefreshFailurePolicy,
	/// How long past expiry [`RefreshFailurePolicy::ServeStale`] may keep serving old keys.
	#[serde(default = "default_stale_while_error")]
	pub stale_while_error: Duration,
}
impl KeySourceConfig {
	/// Construct a configuration with default settings.
	pub fn new(key_url: impl AsRef<str>) -> Result<Self> {
		let key_url = Url::parse(key_url.as_ref())?;

		Ok(Self {
			key_url,
			require_https: true,
			max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
			fetch_timeout: DEFAULT_FETCH_TIMEOUT,
			failure_policy: RefreshFailurePolicy::default(),
			stale_while_error: DEFAULT_STALE_WHILE_ERROR,
		})
	}

	/// Set HTTPS requirement to the desired value.
	pub fn with_require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Override the per-request timeout.
	pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
		self.fetch_timeout = fetch_timeout;

		self
	}

	/// Override the response size guard.
	pub fn with_max_response_bytes(mut self, max_response_bytes: u64) -> Self {
		self.max_response_bytes = max_response_bytes;

		self
	}

	/// Choose what happens to cached keys when a refresh fails.
	pub fn with_failure_policy(mut self, failure_policy: RefreshFailurePolicy) -> Self {
		self.failure_policy = failure_policy;

		self
	}

	/// Bound how long stale keys may be served after expiry.
	pub fn with_stale_while_error(mut self, stale_while_error: Duration) -> Self {
		self.stale_while_error = stale_while_error;

		self
	}

	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		if self.require_https && self.key_url.scheme() != "https" {
			return Err(Error::Config {
				field: "key_url",
				reason: format!("Upstream URL {} must use HTTPS.", self.key_url),
			});
		}
		if self.key_url.host_str().is_none() {
			return Err(Error::Config {
				field: "key_url",
				reason: "Must include a host component.".into(),
			});
		}
		if self.max_response_bytes == 0 {
			return Err(Error::Config {
				field: "max_response_bytes",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.fetch_timeout < MIN_FETCH_TIMEOUT {
			return Err(Error::Config {
				field: "fetch_timeout",
				reason: format!("Must be at least {MIN_FETCH_TIMEOUT:?}."),
			});
		}
		if self.stale_while_error > MAX_STALE_WHILE_ERROR {
			return Err(Error::Config {
				field: "stale_while_error",
				reason: format!("Must not exceed {MAX_STALE_WHILE_ERROR:?}."),
			});
		}
		if self.failure_policy == RefreshFailurePolicy::ServeStale && self.stale_while_error.is_zero()
		{
			return Err(Error::Config {
				field: "stale_while_error",
				reason: "Must be greater than zero when serving stale keys.".into(),
			});
		}

		Ok(())
	}
}

fn default_true() -> bool {
	true
}

fn default_max_response_bytes() -> u64 {
	DEFAULT_MAX_RESPONSE_BYTES
}

fn default_fetch_timeout() -> Duration {
	DEFAULT_FETCH_TIMEOUT
}

fn default_stale_while_error() -> Duration {
	DEFAULT_STALE_WHILE_ERROR
}
