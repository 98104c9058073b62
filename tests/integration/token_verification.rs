//! End-to-end signing and verification against a served key document.

// crates.io
use base64::prelude::*;
use chrono::TimeDelta;
use rsa_keysource::{
	ErrorKind, ManualClock, Result, ServiceAccountSigner, Signer, TokenParts, TokenVerifier,
	select_key, verify_signature,
};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};
// self
use super::*;

fn mint_token(signer: &ServiceAccountSigner, kid: &str) -> Result<String> {
	let header = serde_json::json!({ "alg": "RS256", "kid": kid, "typ": "JWT" });
	let claims = serde_json::json!({
		"iss": signer.email()?,
		"sub": signer.email()?,
		"aud": "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit",
	});
	let content = format!(
		"{}.{}",
		BASE64_URL_SAFE_NO_PAD.encode(header.to_string()),
		BASE64_URL_SAFE_NO_PAD.encode(claims.to_string())
	);
	let signature = signer.sign(content.as_bytes())?;

	Ok(format!("{content}.{}", BASE64_URL_SAFE_NO_PAD.encode(signature)))
}

async fn serve_keys(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path(KEYS_PATH))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(key_document(&[("current", SIGNER_CERT), ("next", OTHER_CERT)]))
				.insert_header("cache-control", "public, max-age=21600"),
		)
		.expect(1)
		.mount(server)
		.await;
}

#[tokio::test]
async fn verifies_signed_token_with_fetched_keys() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	serve_keys(&server).await;

	let clock = ManualClock::new(t0());
	let verifier = TokenVerifier::new(source(config(&server), &clock));
	let signer = ServiceAccountSigner::from_pem("svc@project.iam.gserviceaccount.com", SIGNER_PKCS8)?;
	let token = mint_token(&signer, "current")?;

	assert_eq!(verifier.verify(&token, None).await?, "current");

	clock.advance(TimeDelta::hours(1));

	let mislabelled = mint_token(&signer, "next")?;

	assert_eq!(
		verifier.verify(&mislabelled, None).await.expect_err("signed by other key").kind(),
		ErrorKind::Signature
	);
	assert_eq!(
		verifier.verify(&mint_token(&signer, "retired")?, None).await.expect_err("kid").kind(),
		ErrorKind::UnknownKeyId
	);

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn payload_tampering_is_detected_with_cached_key() -> Result<()> {
	let server = MockServer::start().await;

	serve_keys(&server).await;

	let clock = ManualClock::new(t0());
	let source = source(config(&server), &clock);
	let signer = ServiceAccountSigner::from_pem("svc@project.iam.gserviceaccount.com", SIGNER_PKCS8)?;
	let token = mint_token(&signer, "current")?;
	let parts = TokenParts::parse(&token)?;
	let keys = source.keys(None).await?;
	let key = select_key(&keys, "current")?;

	verify_signature(&parts, key)?;

	let forged_claims = BASE64_URL_SAFE_NO_PAD.encode(r#"{"sub":"admin"}"#);
	let forged = TokenParts::new(parts.header_segment(), forged_claims, parts.signature_segment());

	assert_eq!(verify_signature(&forged, key).expect_err("forged").kind(), ErrorKind::Signature);

	server.verify().await;
	Ok(())
}
