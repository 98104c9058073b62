//! Key document refresh, expiry, and failure handling.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use chrono::TimeDelta;
use reqwest::Client;
use rsa_keysource::{
	ErrorKind, HttpKeySource, KeySource, ManualClock, RefreshFailurePolicy, Result,
	parse_public_key,
};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{header, method, path},
};
// self
use super::*;

fn certs_response(body: String, cache_control: &str) -> ResponseTemplate {
	ResponseTemplate::new(200)
		.set_body_string(body)
		.insert_header("content-type", "application/json")
		.insert_header("cache-control", cache_control)
}

#[tokio::test]
async fn caches_keys_until_max_age_elapses() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(KEYS_PATH))
		.respond_with(certs_response(
			key_document(&[("k1", SIGNER_CERT)]),
			"public, max-age=300, must-revalidate, no-transform",
		))
		.expect(2)
		.mount(&server)
		.await;

	let clock = ManualClock::new(t0());
	let source = source(config(&server), &clock);
	let first = source.keys(None).await?;

	assert_eq!(first.len(), 1);
	assert_eq!(first[0], parse_public_key("k1", SIGNER_CERT)?);
	assert_eq!(source.snapshot().await.expires_at(), t0() + TimeDelta::seconds(300));

	clock.advance(TimeDelta::seconds(299));

	let cached = source.keys(None).await?;

	assert!(Arc::ptr_eq(&first, &cached), "fresh snapshot must be served without a fetch");

	clock.set(t0() + TimeDelta::seconds(301));

	let refreshed = source.keys(None).await?;

	assert!(!Arc::ptr_eq(&first, &refreshed));
	assert_eq!(source.snapshot().await.expires_at(), t0() + TimeDelta::seconds(601));

	let metrics = source.metrics().snapshot();

	assert_eq!(metrics.total_requests, 3);
	assert_eq!(metrics.cache_hits, 1);
	assert_eq!(metrics.refresh_successes, 2);
	assert!(metrics.last_refresh_micros.is_some());
	assert_eq!(metrics.stale_serves, 0);

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn missing_max_age_clears_previous_keys() -> Result<()> {
	let server = MockServer::start().await;
	let counter = Arc::new(AtomicUsize::new(0));
	let handle = counter.clone();

	Mock::given(method("GET"))
		.and(path(KEYS_PATH))
		.respond_with(move |_: &wiremock::Request| {
			let cache_control = match handle.fetch_add(1, Ordering::SeqCst) {
				0 => "public, max-age=60",
				_ => "public, no-cache",
			};

			certs_response(key_document(&[("k1", SIGNER_CERT)]), cache_control)
		})
		.mount(&server)
		.await;

	let clock = ManualClock::new(t0());
	let source = source(config(&server), &clock);

	assert_eq!(source.keys(None).await?.len(), 1);

	clock.advance(TimeDelta::seconds(60));

	let err = source.keys(None).await.expect_err("max-age missing");

	assert_eq!(err.kind(), ErrorKind::Config);
	assert!(source.snapshot().await.is_empty());

	let err = source.keys(None).await.expect_err("still missing");

	assert_eq!(err.kind(), ErrorKind::Config);
	assert_eq!(counter.load(Ordering::SeqCst), 3, "empty cache refetches on every call");
	assert_eq!(source.metrics().snapshot().refresh_errors, 2);

	Ok(())
}

#[tokio::test]
async fn one_bad_certificate_rejects_the_document() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(KEYS_PATH))
		.respond_with(certs_response(
			key_document(&[("k1", SIGNER_CERT), ("k2", EC_CERT)]),
			"max-age=60",
		))
		.expect(1)
		.mount(&server)
		.await;

	let clock = ManualClock::new(t0());
	let source = source(config(&server), &clock);
	let err = source.keys(None).await.expect_err("ec certificate");

	assert_eq!(err.kind(), ErrorKind::KeyType);
	assert!(source.snapshot().await.is_empty());

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn transport_and_body_failures_are_typed() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(KEYS_PATH))
		.respond_with(ResponseTemplate::new(503))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/malformed"))
		.respond_with(certs_response("{ not json".into(), "max-age=60"))
		.mount(&server)
		.await;

	let clock = ManualClock::new(t0());
	let unavailable = source(config(&server), &clock).keys(None).await.expect_err("503");

	assert_eq!(unavailable.kind(), ErrorKind::Network);
	assert!(unavailable.is_transient());

	let malformed = KeySourceConfig::new(format!("{}/malformed", server.uri()))?
		.with_require_https(false);
	let err = source(malformed, &clock).keys(None).await.expect_err("bad json");

	assert_eq!(err.kind(), ErrorKind::Format);

	let oversized = config(&server).with_max_response_bytes(8);
	let server_ok = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(KEYS_PATH))
		.respond_with(certs_response(key_document(&[("k1", SIGNER_CERT)]), "max-age=60"))
		.mount(&server_ok)
		.await;

	let oversized = KeySourceConfig { key_url: config(&server_ok).key_url, ..oversized };
	let err = source(oversized, &clock).keys(None).await.expect_err("too large");

	assert_eq!(err.kind(), ErrorKind::Config);

	Ok(())
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(KEYS_PATH))
		.respond_with(
			certs_response(key_document(&[("k1", SIGNER_CERT), ("k2", OTHER_CERT)]), "max-age=300")
				.set_delay(Duration::from_millis(200)),
		)
		.expect(1)
		.mount(&server)
		.await;

	let clock = ManualClock::new(t0());
	let source = source(config(&server), &clock);
	let mut tasks = Vec::new();

	for _ in 0..8 {
		let source = source.clone();

		tasks.push(tokio::spawn(async move { source.keys(None).await }));
	}

	for task in tasks {
		let keys = task.await.expect("task")?;

		assert_eq!(keys.len(), 2);
	}

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn cancelled_refresh_leaves_cache_cleared() -> Result<()> {
	let server = MockServer::start().await;
	let counter = Arc::new(AtomicUsize::new(0));
	let handle = counter.clone();

	Mock::given(method("GET"))
		.and(path(KEYS_PATH))
		.respond_with(move |_: &wiremock::Request| {
			let response = certs_response(key_document(&[("k1", SIGNER_CERT)]), "max-age=60");

			match handle.fetch_add(1, Ordering::SeqCst) {
				1 => response.set_delay(Duration::from_secs(5)),
				_ => response,
			}
		})
		.mount(&server)
		.await;

	let clock = ManualClock::new(t0());
	let source = source(config(&server), &clock);

	source.keys(None).await?;
	clock.advance(TimeDelta::seconds(61));

	let cancelled = tokio::time::timeout(Duration::from_millis(100), source.keys(None)).await;

	assert!(cancelled.is_err(), "slow refresh should be abandoned");
	assert!(source.snapshot().await.is_empty(), "lock released with the snapshot cleared");
	assert_eq!(source.keys(None).await?.len(), 1);
	assert_eq!(counter.load(Ordering::SeqCst), 3);

	Ok(())
}

#[tokio::test]
async fn serve_stale_policy_keeps_previous_keys_within_window() -> Result<()> {
	let server = MockServer::start().await;
	let counter = Arc::new(AtomicUsize::new(0));
	let handle = counter.clone();

	Mock::given(method("GET"))
		.and(path(KEYS_PATH))
		.respond_with(move |_: &wiremock::Request| match handle.fetch_add(1, Ordering::SeqCst) {
			0 => certs_response(key_document(&[("k1", SIGNER_CERT)]), "max-age=60"),
			_ => ResponseTemplate::new(500),
		})
		.mount(&server)
		.await;

	let clock = ManualClock::new(t0());
	let source = source(
		config(&server)
			.with_failure_policy(RefreshFailurePolicy::ServeStale)
			.with_stale_while_error(Duration::from_secs(120)),
		&clock,
	);
	let first = source.keys(None).await?;

	clock.advance(TimeDelta::seconds(90));

	let stale = source.keys(None).await?;

	assert!(Arc::ptr_eq(&first, &stale));
	assert_eq!(source.snapshot().await.expires_at(), t0() + TimeDelta::seconds(60));

	clock.set(t0() + TimeDelta::seconds(179));
	source.keys(None).await?;

	assert_eq!(counter.load(Ordering::SeqCst), 3, "stale snapshot is retried on every call");

	clock.set(t0() + TimeDelta::seconds(180));

	let err = source.keys(None).await.expect_err("stale window has passed");

	assert_eq!(err.kind(), ErrorKind::Network);
	assert!(source.snapshot().await.is_empty());

	clock.advance(TimeDelta::days(365));

	let err = source.keys(None).await.expect_err("nothing left to serve");

	assert_eq!(err.kind(), ErrorKind::Network);

	let metrics = source.metrics().snapshot();

	assert_eq!(metrics.total_requests, 5);
	assert_eq!(metrics.cache_hits, 0);
	assert_eq!(metrics.stale_serves, 2);
	assert_eq!(metrics.refresh_errors, 4);

	Ok(())
}

#[tokio::test]
async fn override_client_is_used_for_the_call() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(KEYS_PATH))
		.and(header("x-keysource-client", "override"))
		.respond_with(certs_response(key_document(&[("k1", SIGNER_CERT)]), "max-age=60"))
		.expect(1)
		.mount(&server)
		.await;

	let clock = ManualClock::new(t0());
	let source = source(config(&server), &clock);
	let err = source.keys(None).await.expect_err("default client is not matched");

	assert_eq!(err.kind(), ErrorKind::Network);

	let mut headers = http::HeaderMap::new();

	headers.insert("x-keysource-client", http::HeaderValue::from_static("override"));

	let client = Client::builder().default_headers(headers).build()?;
	let keys = KeySource::keys(&source, Some(&client)).await?;

	assert_eq!(keys[0].kid(), "k1");

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn system_clock_source_fetches_over_default_client() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(KEYS_PATH))
		.respond_with(certs_response(key_document(&[("k1", SIGNER_CERT)]), "max-age=3600"))
		.expect(1)
		.mount(&server)
		.await;

	let source = HttpKeySource::new(config(&server))?;

	source.keys(None).await?;
	source.keys(None).await?;

	server.verify().await;
	Ok(())
}
