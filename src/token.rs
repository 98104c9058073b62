//! RS256 signature verification over dot-delimited tokens.

// crates.io
use base64::prelude::*;
use reqwest::Client;
use rsa::Pkcs1v15Sign;
use serde::Deserialize;
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, cache::KeySource, key::PublicKey};

/// Only signing algorithm accepted by [`TokenVerifier`].
pub const RS256: &str = "RS256";

/// The three base64url segments of a token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenParts {
	header: String,
	payload: String,
	signature: String,
}
impl TokenParts {
	/// Assemble parts from already separated segments.
	pub fn new(
		header: impl Into<String>,
		payload: impl Into<String>,
		signature: impl Into<String>,
	) -> Self {
		Self { header: header.into(), payload: payload.into(), signature: signature.into() }
	}

	/// Split a token into exactly three `.` delimited segments.
	pub fn parse(token: &str) -> Result<Self> {
		let mut segments = token.split('.');

		match (segments.next(), segments.next(), segments.next(), segments.next()) {
			(Some(header), Some(payload), Some(signature), None) =>
				Ok(Self::new(header, payload, signature)),
			_ => Err(Error::Format("Token must contain exactly three segments.".into())),
		}
	}

	/// Header segment, still encoded.
	pub fn header_segment(&self) -> &str {
		&self.header
	}

	/// Payload segment, still encoded.
	pub fn payload_segment(&self) -> &str {
		&self.payload
	}

	/// Signature segment, still encoded.
	pub fn signature_segment(&self) -> &str {
		&self.signature
	}

	/// Exact bytes covered by the signature: `header.payload`.
	pub fn signing_input(&self) -> String {
		format!("{}.{}", self.header, self.payload)
	}

	/// Decode the header segment.
	pub fn header(&self) -> Result<TokenHeader> {
		let raw = BASE64_URL_SAFE_NO_PAD
			.decode(&self.header)
			.map_err(|err| Error::Format(format!("Token header is not valid base64url: {err}.")))?;

		Ok(serde_json::from_slice(&raw)?)
	}
}

/// Fields of the token header relevant to key selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
	/// Declared signing algorithm.
	#[serde(default)]
	pub alg: Option<String>,
	/// Id of the key that produced the signature.
	#[serde(default)]
	pub kid: Option<String>,
	/// Declared token type.
	#[serde(default)]
	pub typ: Option<String>,
}

/// Check the RSA PKCS#1 v1.5 SHA-256 signature of `parts` against exactly `key`.
pub fn verify_signature(parts: &TokenParts, key: &PublicKey) -> Result<()> {
	let signature = BASE64_URL_SAFE_NO_PAD
		.decode(&parts.signature)
		.map_err(|err| Error::Signature(format!("Signature is not valid base64url: {err}.")))?;
	let digest = Sha256::digest(parts.signing_input().as_bytes());

	key.key()
		.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
		.map_err(|_| Error::Signature(format!("Signature does not verify with key '{}'.", key.kid())))
}

/// Pick the key published under `kid`.
pub fn select_key<'a>(keys: &'a [PublicKey], kid: &str) -> Result<&'a PublicKey> {
	keys.iter().find(|key| key.kid() == kid).ok_or_else(|| Error::UnknownKeyId(kid.to_owned()))
}

/// Verifies token signatures against keys drawn from a [`KeySource`].
#[derive(Clone, Debug)]
pub struct TokenVerifier<S> {
	source: S,
}
impl<S> TokenVerifier<S>
where
	S: KeySource,
{
	/// Verify tokens with keys from `source`.
	pub fn new(source: S) -> Self {
		Self { source }
	}

	/// Underlying key source.
	pub fn source(&self) -> &S {
		&self.source
	}

	/// Verify the signature layer of `token`, returning the key id that matched.
	///
	/// The header must declare `RS256` and a `kid`. Claims are not inspected.
	#[tracing::instrument(skip_all)]
	pub async fn verify(&self, token: &str, client: Option<&Client>) -> Result<String> {
		let parts = TokenParts::parse(token)?;
		let header = parts.header()?;

		match header.alg.as_deref() {
			Some(RS256) => {},
			other => {
				return Err(Error::Format(format!(
					"Token algorithm {other:?} is not supported; expected {RS256}."
				)));
			},
		}

		let kid =
			header.kid.ok_or_else(|| Error::Format("Token header does not declare a kid.".into()))?;
		let keys = self.source.keys(client).await?;

		verify_signature(&parts, select_key(&keys, &kid)?)?;

		tracing::debug!(kid = %kid, "token signature verified");

		Ok(kid)
	}
}
