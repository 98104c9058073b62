//! HTTP-backed key cache with `Cache-Control` driven expiry.

// crates.io
use reqwest::Client;
use tokio::sync::Mutex;
// self
use crate::{
	_prelude::*,
	cache::state::KeySnapshot,
	clock::{Clock, SystemClock},
	config::{KeySourceConfig, RefreshFailurePolicy},
	http::{
		cache_control::find_max_age,
		client::{default_client, fetch_key_document},
	},
	key::{self, PublicKey},
	metrics::{self, SourceMetrics},
};

/// Fetches RSA public keys from a remote endpoint and caches them until `max-age` elapses.
///
/// One lock guards the snapshot for the whole of [`HttpKeySource::keys`], network fetch
/// included. Concurrent callers queue behind an in-flight refresh and then observe its result
/// instead of fetching again. Clones share the same snapshot.
#[derive(Clone, Debug)]
pub struct HttpKeySource {
	config: Arc<KeySourceConfig>,
	client: Arc<Client>,
	clock: Arc<dyn Clock>,
	snapshot: Arc<Mutex<KeySnapshot>>,
	metrics: Arc<SourceMetrics>,
}
impl HttpKeySource {
	/// Build a key source with the default reqwest client and the system clock.
	pub fn new(config: KeySourceConfig) -> Result<Self> {
		config.validate()?;

		Ok(Self::with_parts(config, default_client()?, Arc::new(SystemClock)))
	}

	/// Build a key source using the supplied default HTTP client.
	pub fn with_client(config: KeySourceConfig, client: Client) -> Result<Self> {
		config.validate()?;

		Ok(Self::with_parts(config, client, Arc::new(SystemClock)))
	}

	/// Build a key source with an explicit client and time source.
	pub fn with_clock(
		config: KeySourceConfig,
		client: Client,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		config.validate()?;

		Ok(Self::with_parts(config, client, clock))
	}

	fn with_parts(config: KeySourceConfig, client: Client, clock: Arc<dyn Clock>) -> Self {
		Self {
			config: Arc::new(config),
			client: Arc::new(client),
			clock,
			snapshot: Arc::new(Mutex::new(KeySnapshot::empty())),
			metrics: SourceMetrics::new(),
		}
	}

	/// Configuration this source was built with.
	pub fn config(&self) -> &KeySourceConfig {
		&self.config
	}

	/// Access the per-source metrics accumulator.
	pub fn metrics(&self) -> Arc<SourceMetrics> {
		self.metrics.clone()
	}

	/// Copy of the currently installed snapshot, without triggering a refresh.
	pub async fn snapshot(&self) -> KeySnapshot {
		self.snapshot.lock().await.clone()
	}

	/// Drop the cached keys so the next [`HttpKeySource::keys`] call refetches.
	pub async fn invalidate(&self) {
		*self.snapshot.lock().await = KeySnapshot::empty();
	}

	/// Return the cached keys, refreshing them first when the snapshot is empty or expired.
	///
	/// `client` overrides the default client for this call. Dropping the returned future
	/// abandons the fetch and releases the lock; under [`RefreshFailurePolicy::Clear`] the cache
	/// is then left empty. Under [`RefreshFailurePolicy::ServeStale`] a failed refresh returns the
	/// previous keys until `stale_while_error` past their expiry, and the error after that.
	#[tracing::instrument(skip(self, client), fields(url = %self.config.key_url))]
	pub async fn keys(&self, client: Option<&Client>) -> Result<Arc<[PublicKey]>> {
		let mut snapshot = self.snapshot.lock().await;

		if !snapshot.is_stale(self.clock.now()) {
			self.observe_lookup(true);

			return Ok(snapshot.keys());
		}

		self.observe_lookup(false);

		let previous = match self.config.failure_policy {
			RefreshFailurePolicy::Clear => {
				*snapshot = KeySnapshot::empty();

				None
			},
			RefreshFailurePolicy::ServeStale => Some(snapshot.clone()),
		};

		match self.refresh(client.unwrap_or(self.client.as_ref())).await {
			Ok((fresh, elapsed)) => {
				tracing::debug!(
					keys = fresh.keys().len(),
					expires_at = %fresh.expires_at(),
					"installed refreshed key snapshot"
				);

				*snapshot = fresh;

				self.observe_refresh_success(elapsed);

				Ok(snapshot.keys())
			},
			Err(err) => {
				self.observe_refresh_error();

				if let Some(previous) = previous
					&& self.may_serve_stale(&previous, self.clock.now())
				{
					tracing::warn!(
						error = %err,
						expires_at = %previous.expires_at(),
						"key refresh failed, serving stale keys"
					);

					self.observe_stale_serve();

					return Ok(previous.keys());
				}

				*snapshot = KeySnapshot::empty();

				tracing::warn!(error = %err, "key refresh failed");

				Err(err)
			},
		}
	}

	/// Stale keys may stand in for a failed refresh only until `stale_while_error` past expiry.
	fn may_serve_stale(&self, previous: &KeySnapshot, now: DateTime<Utc>) -> bool {
		!previous.is_empty()
			&& TimeDelta::from_std(self.config.stale_while_error)
				.ok()
				.and_then(|window| previous.expires_at().checked_add_signed(window))
				.is_some_and(|deadline| now < deadline)
	}

	async fn refresh(&self, client: &Client) -> Result<(KeySnapshot, Duration)> {
		let document = fetch_key_document(client, &self.config).await?;
		let keys = key::parse_public_keys(&document.body)?;
		let max_age = find_max_age(&document.headers)?;
		let expires_at = TimeDelta::from_std(max_age)
			.ok()
			.and_then(|ttl| self.clock.now().checked_add_signed(ttl))
			.ok_or_else(|| Error::Format(format!("max-age of {max_age:?} is out of range.")))?;

		Ok((KeySnapshot::new(keys, expires_at), document.elapsed))
	}

	fn observe_lookup(&self, hit: bool) {
		metrics::record_lookup(self.config.key_url.as_str(), hit);

		if hit {
			self.metrics.record_hit();
		} else {
			self.metrics.record_miss();
		}
	}

	fn observe_stale_serve(&self) {
		metrics::record_stale_serve(self.config.key_url.as_str());

		self.metrics.record_stale_serve();
	}

	fn observe_refresh_success(&self, duration: Duration) {
		metrics::record_refresh_success(self.config.key_url.as_str(), duration);

		self.metrics.record_refresh_success(duration);
	}

	fn observe_refresh_error(&self) {
		metrics::record_refresh_error(self.config.key_url.as_str());

		self.metrics.record_refresh_error();
	}
}
