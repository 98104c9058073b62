//! Metrics helpers and per-source telemetry bookkeeping.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
#[cfg(feature = "metrics")] use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "metrics")] use smallvec::SmallVec;
// self
use crate::_prelude::*;

#[cfg(feature = "metrics")]
type LabelSet = SmallVec<[Label; 2]>;

#[cfg(feature = "metrics")]
const METRIC_REQUESTS_TOTAL: &str = "rsa_keysource_requests_total";
#[cfg(feature = "metrics")]
const METRIC_HITS_TOTAL: &str = "rsa_keysource_hits_total";
#[cfg(feature = "metrics")]
const METRIC_STALE_TOTAL: &str = "rsa_keysource_stale_total";
#[cfg(feature = "metrics")]
const METRIC_REFRESH_TOTAL: &str = "rsa_keysource_refresh_total";
#[cfg(feature = "metrics")]
const METRIC_REFRESH_DURATION: &str = "rsa_keysource_refresh_duration_seconds";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe metrics accumulator for a single key source.
#[derive(Debug, Default)]
pub struct SourceMetrics {
	total_requests: AtomicU64,
	cache_hits: AtomicU64,
	stale_serves: AtomicU64,
	refresh_successes: AtomicU64,
	refresh_errors: AtomicU64,
	last_refresh_micros: AtomicU64,
}
impl SourceMetrics {
	/// Create a new metrics accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a lookup answered from the current snapshot.
	pub fn record_hit(&self) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a lookup that required a refresh.
	pub fn record_miss(&self) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a lookup answered with expired keys after a failed refresh.
	pub fn record_stale_serve(&self) {
		self.stale_serves.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a successful refresh and latency.
	pub fn record_refresh_success(&self, duration: Duration) {
		self.refresh_successes.fetch_add(1, Ordering::Relaxed);
		self.last_refresh_micros.store(duration.as_micros() as u64, Ordering::Relaxed);
	}

	/// Record refresh failure.
	pub fn record_refresh_error(&self) {
		self.refresh_errors.fetch_add(1, Ordering::Relaxed);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> SourceMetricsSnapshot {
		SourceMetricsSnapshot {
			total_requests: self.total_requests.load(Ordering::Relaxed),
			cache_hits: self.cache_hits.load(Ordering::Relaxed),
			stale_serves: self.stale_serves.load(Ordering::Relaxed),
			refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
			refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
			last_refresh_micros: match self.last_refresh_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only snapshot of per-source telemetry counters.
#[derive(Clone, Debug)]
pub struct SourceMetricsSnapshot {
	/// Total number of key lookups observed.
	pub total_requests: u64,
	/// Count of lookups served without a refresh.
	pub cache_hits: u64,
	/// Count of lookups answered with expired keys because the refresh failed.
	pub stale_serves: u64,
	/// Count of successful refresh operations.
	pub refresh_successes: u64,
	/// Count of refresh attempts that resulted in errors.
	pub refresh_errors: u64,
	/// Microsecond latency of the most recent successful refresh.
	pub last_refresh_micros: Option<u64>,
}
impl SourceMetricsSnapshot {
	/// Convenience method to compute the cache hit rate.
	pub fn hit_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.cache_hits as f64 / self.total_requests as f64
		}
	}

	/// Ratio of stale serves over total requests.
	pub fn stale_ratio(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.stale_serves as f64 / self.total_requests as f64
		}
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a key lookup, tagging whether it was answered without a refresh.
pub fn record_lookup(source: &str, hit: bool) {
	#[cfg(feature = "metrics")]
	{
		let labels = base_labels(source);

		metrics::counter!(METRIC_REQUESTS_TOTAL, labels.iter()).increment(1);

		if hit {
			metrics::counter!(METRIC_HITS_TOTAL, labels.iter()).increment(1);
		}
	}
	#[cfg(not(feature = "metrics"))]
	let _ = (source, hit);
}

/// Record a lookup answered with expired keys after a failed refresh.
pub fn record_stale_serve(source: &str) {
	#[cfg(feature = "metrics")]
	metrics::counter!(METRIC_STALE_TOTAL, base_labels(source).iter()).increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = source;
}

/// Record a successful refresh along with its latency.
pub fn record_refresh_success(source: &str, duration: Duration) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(METRIC_REFRESH_TOTAL, status_labels(source, "success").iter())
			.increment(1);
		metrics::histogram!(METRIC_REFRESH_DURATION, base_labels(source).iter())
			.record(duration.as_secs_f64());
	}
	#[cfg(not(feature = "metrics"))]
	let _ = (source, duration);
}

/// Record a failed refresh.
pub fn record_refresh_error(source: &str) {
	#[cfg(feature = "metrics")]
	metrics::counter!(METRIC_REFRESH_TOTAL, status_labels(source, "error").iter()).increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = source;
}

#[cfg(feature = "metrics")]
fn base_labels(source: &str) -> LabelSet {
	let mut labels = LabelSet::new();

	labels.push(Label::new("source", source.to_owned()));

	labels
}

#[cfg(feature = "metrics")]
fn status_labels(source: &str, status: &'static str) -> LabelSet {
	let mut labels = base_labels(source);

	labels.push(Label::new("status", status));

	labels
}
