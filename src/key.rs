//! PEM, X.509, and PKCS decoding for RSA key material.

// std
use std::collections::BTreeMap;
// crates.io
use rsa::{
	RsaPrivateKey, RsaPublicKey,
	pkcs1::{self, DecodeRsaPrivateKey},
	pkcs8::{DecodePrivateKey, DecodePublicKey, PrivateKeyInfo},
};
// self
use crate::_prelude::*;

const RSA_ENCRYPTION_OID: &str = "1.2.840.113549.1.1.1";

/// RSA public key paired with the key id it was published under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
	kid: String,
	key: RsaPublicKey,
}
impl PublicKey {
	/// Pair an already decoded RSA key with its key id.
	pub fn new(kid: impl Into<String>, key: RsaPublicKey) -> Self {
		Self { kid: kid.into(), key }
	}

	/// Key id the certificate was published under.
	pub fn kid(&self) -> &str {
		&self.kid
	}

	/// RSA key material.
	pub fn key(&self) -> &RsaPublicKey {
		&self.key
	}
}

/// Decode one PEM block holding an X.509 certificate and extract its RSA public key.
pub fn parse_public_key(kid: impl Into<String>, encoded: impl AsRef<[u8]>) -> Result<PublicKey> {
	let kid = kid.into();
	let block = pem::parse(encoded.as_ref())?;
	let (_, cert) = x509_parser::parse_x509_certificate(block.contents()).map_err(|err| {
		Error::Format(format!("Certificate for key id '{kid}' cannot be parsed: {err}."))
	})?;
	let spki = cert.public_key();
	let algorithm = spki.algorithm.algorithm.to_id_string();

	if algorithm != RSA_ENCRYPTION_OID {
		return Err(Error::KeyType(format!(
			"Certificate for key id '{kid}' carries a non-RSA key ({algorithm})."
		)));
	}

	let key = RsaPublicKey::from_public_key_der(spki.raw).map_err(|err| {
		Error::Format(format!("RSA key for key id '{kid}' cannot be decoded: {err}."))
	})?;

	Ok(PublicKey { kid, key })
}

/// Parse a JSON object mapping key ids to PEM certificates.
///
/// Any entry that fails to decode rejects the whole document. Keys come back ordered by key id.
pub fn parse_public_keys(document: &[u8]) -> Result<Vec<PublicKey>> {
	let entries: BTreeMap<String, String> = serde_json::from_slice(document)?;

	entries.into_iter().map(|(kid, encoded)| parse_public_key(kid, encoded)).collect()
}

/// Decode an RSA private key from a PEM block, trying PKCS#8 before PKCS#1.
pub fn parse_private_key(encoded: &str) -> Result<RsaPrivateKey> {
	let block = pem::parse(encoded)
		.map_err(|err| Error::Format(format!("No private key data found: {err}.")))?;
	let der = block.contents();
	let pkcs8_err = match RsaPrivateKey::from_pkcs8_der(der) {
		Ok(key) => return Ok(key),
		Err(err) => err,
	};
	let pkcs1_err = match RsaPrivateKey::from_pkcs1_der(der) {
		Ok(key) => return Ok(key),
		Err(err) => err,
	};

	if let Ok(info) = PrivateKeyInfo::try_from(der)
		&& info.algorithm.oid != pkcs1::ALGORITHM_OID
	{
		return Err(Error::KeyType(format!(
			"Private key is not an RSA key ({}).",
			info.algorithm.oid
		)));
	}

	Err(Error::Format(format!(
		"Private key must be PKCS#8 or PKCS#1 encoded; PKCS#8: {pkcs8_err}; PKCS#1: {pkcs1_err}."
	)))
}
