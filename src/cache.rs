//! Public key caching: the [`KeySource`] capability and its implementations.

pub mod manager;
pub mod state;

pub use manager::HttpKeySource;
pub use state::KeySnapshot;

// std
use std::future::Future;
// crates.io
use reqwest::Client;
// self
use crate::{_prelude::*, key::PublicKey};

/// Anything able to hand out the current set of verification keys.
pub trait KeySource: Send + Sync {
	/// Return the current keys, refreshing them first when the implementation requires it.
	///
	/// `client` overrides the HTTP client for this call only; sources that never touch the
	/// network ignore it.
	fn keys(
		&self,
		client: Option<&Client>,
	) -> impl Future<Output = Result<Arc<[PublicKey]>>> + Send;
}

/// Fixed key set that never expires.
#[derive(Clone, Debug)]
pub struct StaticKeySource {
	keys: Arc<[PublicKey]>,
}
impl StaticKeySource {
	/// Wrap a fixed list of keys.
	pub fn new(keys: impl Into<Vec<PublicKey>>) -> Self {
		Self { keys: keys.into().into() }
	}
}
impl KeySource for StaticKeySource {
	async fn keys(&self, _client: Option<&Client>) -> Result<Arc<[PublicKey]>> {
		Ok(self.keys.clone())
	}
}
impl KeySource for HttpKeySource {
	fn keys(
		&self,
		client: Option<&Client>,
	) -> impl Future<Output = Result<Arc<[PublicKey]>>> + Send {
		HttpKeySource::keys(self, client)
	}
}
