#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use oidc_session::{_preludet::*, auth::TokenSet, http::ApiRequest, provider::Issuer};

const CLIENT_ID: &str = "client-dispatch";

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
		.build()
		.expect("Issuer fixture should build successfully.")
}

fn redirect_uri() -> Url {
	Url::parse("http://localhost:3000/callback").expect("Redirect URI fixture should parse.")
}

fn token_set(access: &str, refresh: Option<&str>, expires_in: Duration) -> TokenSet {
	TokenSet {
		access_token: access.into(),
		refresh_token: refresh.map(Into::into),
		id_token: None,
		expires_in: Some(expires_in),
		scope: None,
	}
}

fn api_request(server: &MockServer) -> ApiRequest {
	ApiRequest::get(
		Url::parse(&server.url("/api/scenes")).expect("Mock API endpoint should parse."),
	)
}

#[tokio::test]
async fn dispatch_attaches_the_bearer_token() {
	let server = MockServer::start_async().await;
	let (manager, _storage) =
		build_reqwest_test_manager(build_issuer(&server), CLIENT_ID, redirect_uri(), &[]);

	manager
		.install(token_set("access-live", Some("refresh-live"), Duration::minutes(5)))
		.await
		.expect("Session fixture should install.");

	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/scenes").header("authorization", "Bearer access-live");
			then.status(200).body("[]");
		})
		.await;
	let response = manager.dispatch(api_request(&server)).await.expect("Dispatch should succeed.");

	api.assert_async().await;

	assert_eq!(response.status().as_u16(), 200);
	assert_eq!(response.body(), b"[]");
}

#[tokio::test]
async fn expired_session_is_refreshed_before_the_request_goes_out() {
	let server = MockServer::start_async().await;
	let (manager, _storage) =
		build_reqwest_test_manager(build_issuer(&server), CLIENT_ID, redirect_uri(), &[]);

	manager
		.install(token_set("access-expired", Some("refresh-live"), Duration::ZERO))
		.await
		.expect("Expired session fixture should install.");

	assert!(!manager.is_authenticated());

	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("grant_type=refresh_token");
			then.status(200).header("content-type", "application/json").json_body(
				serde_json::json!({
					"access_token": "access-jit",
					"refresh_token": "refresh-live",
					"token_type": "bearer",
					"expires_in": 300,
				}),
			);
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/scenes").header("authorization", "Bearer access-jit");
			then.status(200).body("ok");
		})
		.await;
	let response = manager.dispatch(api_request(&server)).await.expect("Dispatch should succeed.");

	token.assert_async().await;
	api.assert_async().await;

	assert_eq!(response.status().as_u16(), 200);
	assert!(manager.is_authenticated());
}

#[tokio::test]
async fn expired_session_without_refresh_token_fails_with_zero_network_calls() {
	let server = MockServer::start_async().await;
	let (manager, _storage) =
		build_reqwest_test_manager(build_issuer(&server), CLIENT_ID, redirect_uri(), &[]);
	let any_request = server
		.mock_async(|when, then| {
			when.any_request();
			then.status(200);
		})
		.await;

	manager
		.install(token_set("access-expired", None, Duration::ZERO))
		.await
		.expect("Expired session fixture should install.");

	let err = manager
		.dispatch(api_request(&server))
		.await
		.expect_err("Dispatch without a refresh path should fail locally.");

	assert!(matches!(err, Error::Unauthenticated));

	any_request.assert_calls_async(0).await;
}

#[tokio::test]
async fn a_401_triggers_exactly_one_refresh_and_one_retry() {
	let server = MockServer::start_async().await;
	let (manager, _storage) =
		build_reqwest_test_manager(build_issuer(&server), CLIENT_ID, redirect_uri(), &[]);

	manager
		.install(token_set("access-stale", Some("refresh-live"), Duration::minutes(5)))
		.await
		.expect("Session fixture should install.");

	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/scenes").header("authorization", "Bearer access-stale");
			then.status(401);
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("refresh_token=refresh-live");
			then.status(200).header("content-type", "application/json").json_body(
				serde_json::json!({
					"access_token": "access-fresh",
					"refresh_token": "refresh-live",
					"token_type": "bearer",
					"expires_in": 300,
				}),
			);
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/scenes").header("authorization", "Bearer access-fresh");
			then.status(200).body("retried");
		})
		.await;
	let response = manager
		.dispatch(api_request(&server))
		.await
		.expect("Dispatch should succeed after a 401-driven refresh.");

	rejected.assert_async().await;
	token.assert_calls_async(1).await;
	accepted.assert_async().await;

	assert_eq!(response.body(), b"retried");
}

#[tokio::test]
async fn a_second_401_tears_the_session_down() {
	let server = MockServer::start_async().await;
	let (manager, storage) =
		build_reqwest_test_manager(build_issuer(&server), CLIENT_ID, redirect_uri(), &[]);

	manager
		.install(token_set("access-bad", Some("refresh-live"), Duration::minutes(5)))
		.await
		.expect("Session fixture should install.");

	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/scenes");
			then.status(401);
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").json_body(
				serde_json::json!({
					"access_token": "access-still-bad",
					"refresh_token": "refresh-live",
					"token_type": "bearer",
					"expires_in": 300,
				}),
			);
		})
		.await;
	let err = manager
		.dispatch(api_request(&server))
		.await
		.expect_err("A second 401 should surface as unauthenticated.");

	assert!(matches!(err, Error::Unauthenticated));
	assert!(manager.current_session().is_none());
	assert!(storage.snapshot().is_none());

	api.assert_calls_async(2).await;
	token.assert_calls_async(1).await;
}
