//! `Cache-Control` parsing for key document freshness.

// crates.io
use http::{HeaderMap, header::CACHE_CONTROL};
// self
use crate::_prelude::*;

const MAX_AGE_PREFIX: &str = "max-age=";

/// Extract the `max-age` directive from the first `Cache-Control` header.
///
/// Directives are comma separated and trimmed; the `max-age=` prefix is matched case-sensitively.
pub fn find_max_age(headers: &HeaderMap) -> Result<Duration> {
	let value = cache_control_header(headers).unwrap_or_default();

	for directive in value.split(',').map(str::trim) {
		if let Some(seconds) = directive.strip_prefix(MAX_AGE_PREFIX) {
			let seconds = seconds.parse::<u64>().map_err(|err| {
				Error::Format(format!("Invalid max-age directive '{directive}': {err}."))
			})?;

			return Ok(Duration::from_secs(seconds));
		}
	}

	Err(Error::Config {
		field: "max-age",
		reason: "Could not find expiry time from HTTP headers.".into(),
	})
}

/// Extract cache-control header as string for diagnostics.
pub fn cache_control_header(headers: &HeaderMap) -> Option<String> {
	headers.get(CACHE_CONTROL).and_then(|value| value.to_str().ok()).map(|s| s.to_string())
}
