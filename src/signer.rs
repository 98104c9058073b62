//! Service-account signing with a locally held RSA private key.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use rsa::{Pkcs1v15Sign, RsaPrivateKey, rand_core::OsRng};
use serde::Deserialize;
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, key::parse_private_key};

/// Produces signatures on behalf of an identity.
pub trait Signer {
	/// Identity the signatures are issued for.
	fn email(&self) -> Result<&str>;

	/// Sign `content`, returning the raw signature bytes.
	fn sign(&self, content: &[u8]) -> Result<Vec<u8>>;
}

/// Subset of a service-account credential document needed for signing.
#[derive(Deserialize)]
struct ServiceAccountCredentials {
	#[serde(default)]
	client_email: String,
	#[serde(default)]
	private_key: Option<String>,
}

/// RSA-SHA256 signer for a service account.
///
/// Either the identity or the key may be absent; the operation needing it then fails with a
/// configuration error.
#[derive(Clone)]
pub struct ServiceAccountSigner {
	email: String,
	key: Option<RsaPrivateKey>,
}
impl ServiceAccountSigner {
	/// Pair an identity with an optional private key.
	pub fn new(email: impl Into<String>, key: Option<RsaPrivateKey>) -> Self {
		Self { email: email.into(), key }
	}

	/// Build a signer from a PEM encoded PKCS#8 or PKCS#1 RSA private key.
	pub fn from_pem(email: impl Into<String>, pem: &str) -> Result<Self> {
		Ok(Self::new(email, Some(parse_private_key(pem)?)))
	}

	/// Build a signer from a service-account credential JSON document.
	///
	/// Reads `client_email` and `private_key`; other fields are ignored.
	pub fn from_json(document: &[u8]) -> Result<Self> {
		let credentials: ServiceAccountCredentials = serde_json::from_slice(document)?;
		let key = credentials.private_key.as_deref().map(parse_private_key).transpose()?;

		Ok(Self::new(credentials.client_email, key))
	}

	/// Whether a private key is configured.
	pub fn has_private_key(&self) -> bool {
		self.key.is_some()
	}
}
impl Signer for ServiceAccountSigner {
	fn email(&self) -> Result<&str> {
		if self.email.is_empty() {
			return Err(Error::Config {
				field: "email",
				reason: "Service account email not available.".into(),
			});
		}

		Ok(&self.email)
	}

	fn sign(&self, content: &[u8]) -> Result<Vec<u8>> {
		let key = self.key.as_ref().ok_or_else(|| Error::Config {
			field: "private_key",
			reason: "Private key not available.".into(),
		})?;
		let digest = Sha256::digest(content);

		key.sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha256>(), &digest)
			.map_err(|err| Error::Signature(format!("RSA signing failed: {err}.")))
	}
}
impl Debug for ServiceAccountSigner {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("ServiceAccountSigner")
			.field("email", &self.email)
			.field("has_private_key", &self.key.is_some())
			.finish()
	}
}
