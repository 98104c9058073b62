//! HTTP client integration for key document retrieval.

// crates.io
use http::HeaderMap;
use reqwest::{Client, Response, redirect::Policy};
use url::Url;
// self
use crate::{_prelude::*, config::KeySourceConfig};

/// Maximum redirect depth followed by the default client.
pub const MAX_REDIRECTS: usize = 10;
/// Bytes of a non-success response body kept in [`Error::HttpStatus`].
pub const MAX_ERROR_BODY_BYTES: u64 = 4_096;

/// Raw key document returned by the upstream endpoint.
#[derive(Clone, Debug)]
pub struct KeyDocument {
	/// Response headers, consulted for cache freshness.
	pub headers: HeaderMap,
	/// Full response body.
	pub body: Vec<u8>,
	/// Round-trip duration of the exchange.
	pub elapsed: Duration,
}

/// Build the client used when a caller does not supply one.
pub fn default_client() -> Result<Client> {
	let client = Client::builder()
		.redirect(Policy::limited(MAX_REDIRECTS))
		.user_agent(format!("rsa-keysource/{}", env!("CARGO_PKG_VERSION")))
		.connect_timeout(Duration::from_secs(5))
		.build()?;

	Ok(client)
}

/// Ensure the provided URL uses HTTPS.
pub fn enforce_https(url: &Url) -> Result<()> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(Error::Security(format!("Upstream URL {url} must use HTTPS.")))
	}
}

/// GET the configured key document and read its body in full.
///
/// The body is streamed and the fetch fails as soon as it grows past
/// `max_response_bytes`, whether or not the server announced a `Content-Length`.
pub async fn fetch_key_document(client: &Client, config: &KeySourceConfig) -> Result<KeyDocument> {
	if config.require_https {
		enforce_https(&config.key_url)?;
	}

	let start = Instant::now();
	let mut response = client
		.get(config.key_url.clone())
		.header(http::header::ACCEPT, "application/json")
		.timeout(config.fetch_timeout)
		.send()
		.await?;
	let status = response.status();

	if !status.is_success() {
		let body = read_capped(&mut response, MAX_ERROR_BODY_BYTES)
			.await
			.ok()
			.map(|(body, _)| String::from_utf8_lossy(&body).into_owned());

		return Err(Error::HttpStatus { status, url: config.key_url.clone(), body });
	}
	if let Some(length) = response.content_length()
		&& length > config.max_response_bytes
	{
		return Err(oversized(config.max_response_bytes));
	}

	let headers = response.headers().clone();
	let (body, truncated) = read_capped(&mut response, config.max_response_bytes).await?;

	if truncated {
		return Err(oversized(config.max_response_bytes));
	}

	let elapsed = start.elapsed();

	tracing::debug!(
		url = %config.key_url,
		status = %status,
		bytes = body.len(),
		elapsed = ?elapsed,
		"key document fetch complete"
	);

	Ok(KeyDocument { headers, body, elapsed })
}

/// Read at most `limit` bytes of the body; the flag is set when more data was pending.
async fn read_capped(response: &mut Response, limit: u64) -> Result<(Vec<u8>, bool)> {
	let mut body = Vec::new();

	while let Some(chunk) = response.chunk().await? {
		let remaining = limit.saturating_sub(body.len() as u64) as usize;

		if chunk.len() > remaining {
			body.extend_from_slice(&chunk[..remaining]);

			return Ok((body, true));
		}

		body.extend_from_slice(&chunk);
	}

	Ok((body, false))
}

fn oversized(limit: u64) -> Error {
	Error::Config {
		field: "max_response_bytes",
		reason: format!("Response body exceeds the configured guard of {limit} bytes."),
	}
}
