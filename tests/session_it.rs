#![cfg(feature = "reqwest")]

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use httpmock::prelude::*;
// self
use oidc_session::{
	_preludet::*,
	provider::Issuer,
	store::{PersistedTokens, SessionStorage},
};

const CLIENT_ID: &str = "client-session";

fn build_issuer(server: &MockServer) -> Issuer {
	Issuer::builder()
		.authorization_endpoint(
			Url::parse(&server.url("/authorize"))
				.expect("Mock authorize endpoint should parse successfully."),
		)
		.token_endpoint(
			Url::parse(&server.url("/token"))
				.expect("Mock token endpoint should parse successfully."),
		)
		.userinfo_endpoint(
			Url::parse(&server.url("/userinfo"))
				.expect("Mock userinfo endpoint should parse successfully."),
		)
		.end_session_endpoint(
			Url::parse(&server.url("/logout"))
				.expect("Mock end-session endpoint should parse successfully."),
		)
		.build()
		.expect("Issuer fixture should build successfully.")
}

fn redirect_uri() -> Url {
	Url::parse("http://localhost:3000/callback").expect("Redirect URI fixture should parse.")
}

fn encode_jwt(payload: &serde_json::Value) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
	let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());

	format!("{header}.{body}.sig")
}

fn jwt_access_token(subject: &str, expires_in: Duration) -> String {
	encode_jwt(&serde_json::json!({
		"sub": subject,
		"preferred_username": subject,
		"exp": (OffsetDateTime::now_utc() + expires_in).unix_timestamp(),
	}))
}

async fn seed_storage(
	storage: &(impl SessionStorage + ?Sized),
	access: String,
	refresh: Option<&str>,
) {
	storage
		.save(PersistedTokens {
			access_token: access,
			refresh_token: refresh.map(Into::into),
			id_token: None,
		})
		.await
		.expect("Failed to seed persisted tokens for restore test.");
}

#[tokio::test]
async fn restore_installs_an_unexpired_snapshot_without_network() {
	let server = MockServer::start_async().await;
	let (manager, storage) =
		build_reqwest_test_manager(build_issuer(&server), CLIENT_ID, redirect_uri(), &[]);
	let any_request = server
		.mock_async(|when, then| {
			when.any_request();
			then.status(200);
		})
		.await;

	seed_storage(storage.as_ref(), jwt_access_token("user-9", Duration::minutes(10)), None).await;

	let restored = manager.restore().await.expect("Restore should succeed.");

	assert!(restored);
	assert!(manager.is_authenticated());
	assert_eq!(
		manager.current_identity().expect("Identity should be derived on restore.").subject,
		"user-9",
	);

	any_request.assert_calls_async(0).await;
}

#[tokio::test]
async fn restore_refreshes_an_expired_snapshot() {
	let server = MockServer::start_async().await;
	let (manager, storage) =
		build_reqwest_test_manager(build_issuer(&server), CLIENT_ID, redirect_uri(), &[]);
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.body_includes("grant_type=refresh_token")
				.body_includes("refresh_token=refresh-startup");
			then.status(200).header("content-type", "application/json").json_body(
				serde_json::json!({
					"access_token": "access-restored",
					"refresh_token": "refresh-rotated",
					"token_type": "bearer",
					"expires_in": 900,
				}),
			);
		})
		.await;

	seed_storage(
		storage.as_ref(),
		jwt_access_token("user-9", Duration::minutes(-10)),
		Some("refresh-startup"),
	)
	.await;

	let restored = manager.restore().await.expect("Restore should succeed.");

	token.assert_async().await;

	assert!(restored);
	assert!(manager.is_authenticated());
	assert_eq!(
		manager
			.current_session()
			.expect("Session should be installed after a startup refresh.")
			.access_token
			.expose(),
		"access-restored",
	);
	assert_eq!(
		storage.snapshot().expect("Rotated tokens should be persisted.").refresh_token.as_deref(),
		Some("refresh-rotated"),
	);
}

#[tokio::test]
async fn restore_with_empty_storage_reports_logged_out() {
	let server = MockServer::start_async().await;
	let (manager, _storage) =
		build_reqwest_test_manager(build_issuer(&server), CLIENT_ID, redirect_uri(), &[]);

	assert!(!manager.restore().await.expect("Restore of empty storage should succeed."));
	assert!(!manager.is_authenticated());
}

#[tokio::test]
async fn restore_clears_a_stale_snapshot_without_a_refresh_token() {
	let server = MockServer::start_async().await;
	let (manager, storage) =
		build_reqwest_test_manager(build_issuer(&server), CLIENT_ID, redirect_uri(), &[]);

	seed_storage(storage.as_ref(), jwt_access_token("user-9", Duration::minutes(-10)), None).await;

	assert!(!manager.restore().await.expect("Restore should succeed."));
	assert!(storage.snapshot().is_none());
	assert!(!manager.is_authenticated());
}

#[tokio::test]
async fn failed_startup_refresh_leaves_the_manager_logged_out() {
	let server = MockServer::start_async().await;
	let (manager, storage) =
		build_reqwest_test_manager(build_issuer(&server), CLIENT_ID, redirect_uri(), &[]);

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;

	seed_storage(
		storage.as_ref(),
		jwt_access_token("user-9", Duration::minutes(-10)),
		Some("refresh-revoked"),
	)
	.await;

	assert!(!manager.restore().await.expect("Restore should absorb the refresh failure."));
	assert!(!manager.is_authenticated());
	assert!(storage.snapshot().is_none());
}

#[tokio::test]
async fn logout_clears_everything_and_builds_the_end_session_url() {
	let server = MockServer::start_async().await;
	let (manager, storage) =
		build_reqwest_test_manager(build_issuer(&server), CLIENT_ID, redirect_uri(), &[]);
	let manager = manager.with_post_logout_redirect(
		Url::parse("http://localhost:3000/").expect("Post-logout redirect fixture should parse."),
	);

	manager
		.install(oidc_session::auth::TokenSet {
			access_token: "access-logout".into(),
			refresh_token: Some("refresh-logout".into()),
			id_token: Some("id-token-logout".into()),
			expires_in: Some(Duration::minutes(5)),
			scope: None,
		})
		.await
		.expect("Session fixture should install.");

	assert!(manager.is_authenticated());

	let end_session = manager
		.logout()
		.await
		.expect("Logout should succeed.")
		.expect("End-session URL should be produced when the issuer declares the endpoint.");
	let query = end_session.query().expect("End-session URL should carry query parameters.");

	assert!(query.contains("client_id=client-session"));
	assert!(query.contains("id_token_hint=id-token-logout"));
	assert!(query.contains("post_logout_redirect_uri="));
	assert!(!manager.is_authenticated());
	assert!(manager.current_session().is_none());
	assert!(manager.current_identity().is_none());
	assert!(storage.snapshot().is_none());

	// A logged-out manager refuses to refresh.
	assert!(matches!(
		manager.refresh().await.expect_err("Refresh after logout should fail."),
		Error::Unauthenticated,
	));
}
