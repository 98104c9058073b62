//! Wall-clock abstraction used for cache expiry decisions.

// std
use std::sync::Mutex;
// self
use crate::_prelude::*;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
	/// Current instant in UTC.
	fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Deterministic clock that only moves when told to.
///
/// Clones share the same reading, so a test can keep one handle while the cache owns another.
#[derive(Clone, Debug)]
pub struct ManualClock {
	now: Arc<Mutex<DateTime<Utc>>>,
}
impl ManualClock {
	/// Create a clock frozen at `now`.
	pub fn new(now: DateTime<Utc>) -> Self {
		Self { now: Arc::new(Mutex::new(now)) }
	}

	/// Jump to an absolute instant.
	pub fn set(&self, now: DateTime<Utc>) {
		*self.lock() = now;
	}

	/// Move the reading forward by `delta`.
	pub fn advance(&self, delta: TimeDelta) {
		let mut now = self.lock();

		*now += delta;
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
		// A poisoned guard still holds a valid timestamp.
		self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}
impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.lock()
	}
}
