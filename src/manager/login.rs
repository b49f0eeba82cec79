//! Authorization Code + PKCE login: authorize-URL construction, callback
//! validation, and code exchange.
//!
//! [`SessionManager::begin_login`] mints a fresh `state` + PKCE verifier pair
//! and records it as the single pending attempt; starting a new login replaces
//! any previous one. [`SessionManager::complete_login`] consumes the pending
//! attempt regardless of outcome, so a replayed callback can never be validated
//! twice.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	http::TokenHttpClient,
	manager::SessionManager,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods surfaced via [`LoginAttempt`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Login handshake metadata returned by [`SessionManager::begin_login`].
#[derive(Clone)]
pub struct LoginAttempt {
	/// Opaque state value that must round-trip via the redirect handler.
	pub state: String,
	/// Requested scope set.
	pub scope: ScopeSet,
	/// Redirect URI the callback will arrive on.
	pub redirect_uri: Url,
	/// Fully-formed authorize URL that callers should send the end-user to.
	pub authorize_url: Url,
	pkce: PkcePair,
}
impl LoginAttempt {
	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.pkce.challenge
	}

	/// Secret PKCE verifier minted for this attempt.
	///
	/// Callers completing the login from another process can persist it
	/// alongside `state`; it must never be logged. `Debug` keeps it redacted.
	pub fn code_verifier(&self) -> &str {
		&self.pkce.verifier
	}

	/// PKCE challenge method (currently always `S256`).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		self.pkce.method
	}
}
impl Debug for LoginAttempt {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginAttempt")
			.field("state", &self.state)
			.field("scope", &self.scope)
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.field("code_challenge", &self.pkce.challenge)
			.field("code_challenge_method", &self.pkce.method)
			.finish()
	}
}

// Secret half of a started login; held by the manager, never exposed.
#[derive(Clone, Debug)]
pub(crate) struct PendingLogin {
	pub(crate) state: String,
	pub(crate) verifier: String,
}

/// Parameters extracted from the authorization callback redirect.
#[derive(Clone, Debug, Default)]
pub struct CallbackParams {
	/// Authorization code, when the provider granted one.
	pub code: Option<String>,
	/// Round-tripped state value.
	pub state: Option<String>,
	/// OAuth error code, when the provider denied the request.
	pub error: Option<String>,
	/// Optional human-readable error description.
	pub error_description: Option<String>,
}
impl CallbackParams {
	/// Extracts callback parameters from the full redirect URL.
	pub fn from_url(url: &Url) -> Self {
		let mut params = Self::default();

		for (key, value) in url.query_pairs() {
			match key.as_ref() {
				"code" => params.code = Some(value.into_owned()),
				"state" => params.state = Some(value.into_owned()),
				"error" => params.error = Some(value.into_owned()),
				"error_description" => params.error_description = Some(value.into_owned()),
				_ => {},
			}
		}

		params
	}

	/// Builds callback parameters from already-extracted values.
	pub fn from_parts(code: Option<String>, state: Option<String>) -> Self {
		Self { code, state, error: None, error_description: None }
	}
}

#[derive(Clone)]
pub(crate) struct PkcePair {
	pub(crate) verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	pub(crate) fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}
}

impl<C, M> SessionManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts a login attempt: mints state + PKCE material and returns the
	/// authorize URL to redirect the end-user to.
	///
	/// Replaces any previously pending attempt.
	pub fn begin_login(&self) -> LoginAttempt {
		let state = random_string(STATE_LEN);
		let pkce = PkcePair::generate();
		let authorize_url = build_authorize_url(
			&self.issuer.endpoints.authorization,
			&self.client_id,
			&self.redirect_uri,
			&self.scope,
			&state,
			&pkce,
		);

		*self.pending_login.lock() =
			Some(PendingLogin { state: state.clone(), verifier: pkce.verifier.clone() });

		LoginAttempt {
			state,
			scope: self.scope.clone(),
			redirect_uri: self.redirect_uri.clone(),
			authorize_url,
			pkce,
		}
	}

	/// Completes a login from the full callback redirect URL.
	pub async fn complete_login(&self, callback_url: &Url) -> Result<()> {
		self.complete_login_with(CallbackParams::from_url(callback_url)).await
	}

	/// Completes a login from already-extracted callback parameters.
	///
	/// Validates the callback against the pending attempt, exchanges the code
	/// (with the PKCE verifier) at the token endpoint, and installs the
	/// resulting session. The pending attempt is consumed whether or not
	/// validation succeeds.
	pub async fn complete_login_with(&self, params: CallbackParams) -> Result<()> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "complete_login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let pending = self.pending_login.lock().take();

				if let Some(error) = params.error {
					return Err(Error::AuthorizationDenied {
						error,
						description: params.error_description,
					});
				}

				let Some(code) = params.code else {
					return Err(Error::MalformedCallback {
						reason: "callback carries neither a code nor an error".into(),
					});
				};
				let Some(pending) = pending else {
					return Err(Error::MalformedCallback {
						reason: "no login attempt is pending".into(),
					});
				};

				if params.state.as_deref() != Some(pending.state.as_str()) {
					return Err(Error::StateMismatch);
				}

				let tokens =
					self.token_client()?.exchange_code(&code, &pending.verifier).await?;

				self.install_inner(tokens, None).await?;

				Ok(())
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}

fn build_authorize_url(
	authorization_endpoint: &Url,
	client_id: &str,
	redirect_uri: &Url,
	scope: &ScopeSet,
	state: &str,
	pkce: &PkcePair,
) -> Url {
	let mut url = authorization_endpoint.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", client_id);
	pairs.append_pair("redirect_uri", redirect_uri.as_str());

	if !scope.is_empty() {
		pairs.append_pair("scope", &scope.normalized());
	}

	pairs.append_pair("state", state);
	pairs.append_pair("code_challenge", &pkce.challenge);
	pairs.append_pair("code_challenge_method", pkce.method.as_str());

	drop(pairs);

	url
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(verifier.as_bytes());
	let digest = hasher.finalize();
	URL_SAFE_NO_PAD.encode(digest)
}
