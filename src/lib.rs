//! Async RSA certificate key cache with Cache-Control driven expiry, RS256 signature
//! verification, and service-account signing.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod http;
pub mod key;
pub mod metrics;
pub mod signer;
pub mod token;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	cache::{HttpKeySource, KeySnapshot, KeySource, StaticKeySource},
	clock::{Clock, ManualClock, SystemClock},
	config::{KeySourceConfig, RefreshFailurePolicy},
	error::{Error, ErrorKind, Result},
	key::{PublicKey, parse_private_key, parse_public_key, parse_public_keys},
	signer::{ServiceAccountSigner, Signer},
	token::{TokenHeader, TokenParts, TokenVerifier, select_key, verify_signature},
};
