//! Immutable key snapshots installed by the cache.

// self
use crate::{_prelude::*, key::PublicKey};

/// Key set plus the instant it stops being fresh.
///
/// Snapshots are replaced wholesale; callers only ever see shared, read-only copies.
#[derive(Clone, Debug)]
pub struct KeySnapshot {
	keys: Arc<[PublicKey]>,
	expires_at: DateTime<Utc>,
}
impl KeySnapshot {
	/// Snapshot holding no keys, stale at any instant.
	pub fn empty() -> Self {
		Self { keys: Arc::from(Vec::new()), expires_at: DateTime::<Utc>::MIN_UTC }
	}

	/// Snapshot of `keys` fresh until `expires_at`.
	///
	/// An `expires_at` at or before the current instant (a `max-age=0` response, for one) yields a
	/// snapshot that is already stale: its keys are still handed to the caller that fetched them,
	/// and the next lookup refreshes again.
	pub fn new(keys: Vec<PublicKey>, expires_at: DateTime<Utc>) -> Self {
		Self { keys: keys.into(), expires_at }
	}

	/// Shared handle to the keys.
	pub fn keys(&self) -> Arc<[PublicKey]> {
		self.keys.clone()
	}

	/// Instant at which the snapshot must be refreshed.
	pub fn expires_at(&self) -> DateTime<Utc> {
		self.expires_at
	}

	/// Whether the snapshot holds no keys.
	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}

	/// Whether a refresh is due at `now`: the snapshot is empty or its expiry is not after `now`.
	pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
		self.keys.is_empty() || self.expires_at <= now
	}

	/// Look up a key by id.
	pub fn find(&self, kid: &str) -> Option<&PublicKey> {
		self.keys.iter().find(|key| key.kid() == kid)
	}
}
impl Default for KeySnapshot {
	fn default() -> Self {
		Self::empty()
	}
}
