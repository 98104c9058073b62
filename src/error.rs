//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the key source crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Pem(#[from] pem::PemError),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Configuration invalid for {field}: {reason}")]
	Config { field: &'static str, reason: String },
	#[error("Malformed input: {0}")]
	Format(String),
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: http::StatusCode, url: url::Url, body: Option<String> },
	#[error("Unsupported key type: {0}")]
	KeyType(String),
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Security violation: {0}")]
	Security(String),
	#[error("Signature rejected: {0}")]
	Signature(String),
	#[error("No public key found for key id '{0}'.")]
	UnknownKeyId(String),
}
impl Error {
	/// Classify the error so callers can decide whether to retry, reject, or fall back.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Reqwest(_) | Self::HttpStatus { .. } => ErrorKind::Network,
			Self::Pem(_) | Self::Serde(_) | Self::Format(_) => ErrorKind::Format,
			Self::KeyType(_) => ErrorKind::KeyType,
			Self::Url(_) | Self::Config { .. } | Self::Metrics(_) | Self::Security(_) =>
				ErrorKind::Config,
			Self::Signature(_) => ErrorKind::Signature,
			Self::UnknownKeyId(_) => ErrorKind::UnknownKeyId,
		}
	}

	/// Whether the failure came from the transport and may succeed on a later attempt.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Reqwest(_) => true,
			Self::HttpStatus { status, .. } =>
				status.is_server_error() || *status == http::StatusCode::TOO_MANY_REQUESTS,
			_ => false,
		}
	}
}

/// Coarse failure categories exposed to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// Transport or request failure, including non-success upstream statuses.
	Network,
	/// Malformed JSON, PEM, certificate, token, or signature encoding.
	Format,
	/// Key material that is not RSA.
	KeyType,
	/// Missing or invalid configuration, including an absent `max-age` directive.
	Config,
	/// Signature did not verify against the supplied key.
	Signature,
	/// No cached key carries the requested key id.
	UnknownKeyId,
}
