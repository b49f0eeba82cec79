//! Session lifecycle orchestration: login, refresh, userinfo, and dispatch.

pub mod dispatch;
pub mod login;
pub mod refresh;
pub mod userinfo;

pub use login::*;
pub use refresh::*;

// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	auth::{AuthSession, ScopeSet, TokenSet, UserIdentity, claims},
	http::TokenHttpClient,
	oauth::{TokenClient, TransportErrorMapper},
	provider::Issuer,
	store::SessionStorage,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Session manager specialized for the crate's default reqwest transport stack.
pub type ReqwestSessionManager = SessionManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

// Epoch-guarded session slot. The epoch is bumped on logout/clear so in-flight
// refresh and install results observing an older epoch are discarded instead of
// resurrecting a terminated session.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
	pub(crate) session: Option<AuthSession>,
	pub(crate) identity: Option<UserIdentity>,
	pub(crate) epoch: u64,
}

/// Coordinates a single end-user's OpenID Connect session against one issuer.
///
/// The manager owns the HTTP client, persistence backend, and issuer metadata so
/// individual flows can focus on their own logic (state + PKCE generation, code
/// exchanges, refresh rotations, bearer dispatch). All session mutations go
/// through one internal lock: the access, refresh, and ID tokens are always
/// replaced together.
pub struct SessionManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Persistence backend that receives token snapshots.
	pub storage: Arc<dyn SessionStorage>,
	/// Issuer metadata defining the OpenID Connect endpoints.
	pub issuer: Issuer,
	/// OAuth 2.0 public client identifier.
	pub client_id: String,
	/// Redirect URI registered for the authorization-code flow.
	pub redirect_uri: Url,
	/// Scopes requested on login; always contains `openid`.
	pub scope: ScopeSet,
	/// Optional redirect applied to end-session URLs.
	pub post_logout_redirect_uri: Option<Url>,
	/// Shared metrics recorder for refresh flow outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	pub(crate) state: Arc<RwLock<SessionState>>,
	pub(crate) pending_login: Arc<Mutex<Option<PendingLogin>>>,
	pub(crate) refresh_guard: Arc<AsyncMutex<()>>,
	pub(crate) refresh_timer: Arc<Mutex<Option<JoinHandle<()>>>>,
}
impl<C, M> SessionManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager that reuses the caller-provided transport + mapper pair.
	///
	/// The `openid` scope is appended to `scope` if absent.
	pub fn with_http_client(
		storage: Arc<dyn SessionStorage>,
		issuer: Issuer,
		client_id: impl Into<String>,
		redirect_uri: Url,
		scope: ScopeSet,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			storage,
			issuer,
			client_id: client_id.into(),
			redirect_uri,
			scope: scope.with_openid(),
			post_logout_redirect_uri: None,
			refresh_metrics: Default::default(),
			state: Default::default(),
			pending_login: Default::default(),
			refresh_guard: Default::default(),
			refresh_timer: Default::default(),
		}
	}

	/// Sets the redirect applied to end-session URLs produced by [`Self::logout`].
	pub fn with_post_logout_redirect(mut self, redirect: Url) -> Self {
		self.post_logout_redirect_uri = Some(redirect);

		self
	}

	/// Returns true while an unexpired access token is installed.
	pub fn is_authenticated(&self) -> bool {
		let now = OffsetDateTime::now_utc();

		self.state.read().session.as_ref().is_some_and(|session| session.is_active_at(now))
	}

	/// Returns a snapshot of the installed session, if any.
	pub fn current_session(&self) -> Option<AuthSession> {
		self.state.read().session.clone()
	}

	/// Returns the identity derived at install or userinfo time, if any.
	pub fn current_identity(&self) -> Option<UserIdentity> {
		self.state.read().identity.clone()
	}

	/// Installs a token set as the live session, replacing any previous one.
	///
	/// Persists the snapshot, derives the user identity from token claims, and
	/// arms the proactive refresh timer. A token set with a non-positive expiry
	/// installs successfully but the manager reports unauthenticated.
	pub async fn install(&self, tokens: TokenSet) -> Result<AuthSession> {
		self.install_inner(tokens, None).await
	}

	pub(crate) async fn install_inner(
		&self,
		tokens: TokenSet,
		expected_epoch: Option<u64>,
	) -> Result<AuthSession> {
		let now = OffsetDateTime::now_utc();
		let session = AuthSession::from_token_set(&tokens, &self.scope, now)?;
		let identity = derive_identity(&session);
		let persisted = session.persisted();
		let installed_epoch = {
			let mut state = self.state.write();

			if expected_epoch.is_some_and(|expected| expected != state.epoch) {
				return Err(Error::Unauthenticated);
			}

			state.session = Some(session.clone());
			state.identity = identity;

			state.epoch
		};

		self.storage.save(persisted).await?;

		// Logout may have raced the save; its clear ran before the snapshot
		// landed, so undo the write instead of leaving a ghost session behind.
		if self.state.read().epoch != installed_epoch {
			let _ = self.storage.clear().await;

			return Err(Error::Unauthenticated);
		}

		if session.refresh_token.is_some() {
			self.arm_refresh_timer(session.expires_at);
		}

		Ok(session)
	}

	/// Terminates the session: cancels the refresh timer, wipes memory and
	/// storage, and returns the issuer's end-session URL when one is declared.
	pub async fn logout(&self) -> Result<Option<Url>> {
		self.cancel_refresh_timer();

		let id_token = {
			let mut state = self.state.write();

			state.epoch += 1;
			state.identity = None;

			state.session.take().and_then(|session| session.id_token)
		};

		self.storage.clear().await?;

		Ok(self.issuer.end_session_url(
			&self.client_id,
			self.post_logout_redirect_uri.as_ref(),
			id_token.as_ref().map(|token| token.expose()),
		))
	}

	/// Rehydrates the session from storage.
	///
	/// An unexpired snapshot is installed directly; an expired one with a
	/// refresh token triggers an immediate refresh. Returns `Ok(true)` when an
	/// active session results, `Ok(false)` otherwise (stale snapshots are
	/// cleared, and a failed startup refresh leaves the manager logged out).
	pub async fn restore(&self) -> Result<bool> {
		let Some(persisted) = self.storage.load().await? else {
			return Ok(false);
		};
		let now = OffsetDateTime::now_utc();
		let Some(session) = AuthSession::from_persisted(&persisted, self.scope.clone(), now) else {
			self.storage.clear().await?;

			return Ok(false);
		};

		if session.is_active_at(now) {
			let has_refresh = session.refresh_token.is_some();
			let expires_at = session.expires_at;

			self.install_state(session);

			if has_refresh {
				self.arm_refresh_timer(expires_at);
			}

			return Ok(true);
		}

		if session.refresh_token.is_some() {
			self.install_state(session);

			return match self.refresh().await {
				Ok(()) => Ok(true),
				// Refresh failure already tore the session down.
				Err(_) => Ok(false),
			};
		}

		self.storage.clear().await?;

		Ok(false)
	}

	pub(crate) fn install_state(&self, session: AuthSession) {
		let identity = derive_identity(&session);
		let mut state = self.state.write();

		state.session = Some(session);
		state.identity = identity;
	}

	pub(crate) fn token_client(&self) -> Result<TokenClient<C, M>> {
		TokenClient::from_issuer(
			&self.issuer,
			&self.client_id,
			&self.redirect_uri,
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}
}
#[cfg(feature = "reqwest")]
impl SessionManager<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a manager with the bundled reqwest transport.
	///
	/// The transport applies the crate's default timeout and disables redirect
	/// following; use [`SessionManager::with_http_client`] to supply a custom
	/// client.
	pub fn new(
		storage: Arc<dyn SessionStorage>,
		issuer: Issuer,
		client_id: impl Into<String>,
		redirect_uri: Url,
		scope: ScopeSet,
	) -> Result<Self> {
		Ok(Self::with_http_client(
			storage,
			issuer,
			client_id,
			redirect_uri,
			scope,
			ReqwestHttpClient::bounded()?,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Clone for SessionManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			storage: self.storage.clone(),
			issuer: self.issuer.clone(),
			client_id: self.client_id.clone(),
			redirect_uri: self.redirect_uri.clone(),
			scope: self.scope.clone(),
			post_logout_redirect_uri: self.post_logout_redirect_uri.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			state: self.state.clone(),
			pending_login: self.pending_login.clone(),
			refresh_guard: self.refresh_guard.clone(),
			refresh_timer: self.refresh_timer.clone(),
		}
	}
}
impl<C, M> Debug for SessionManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionManager")
			.field("issuer", &self.issuer)
			.field("client_id", &self.client_id)
			.field("redirect_uri", &self.redirect_uri)
			.field("scope", &self.scope)
			.field("authenticated", &self.is_authenticated())
			.finish()
	}
}

fn derive_identity(session: &AuthSession) -> Option<UserIdentity> {
	// ID token claims are authoritative; access token claims are a fallback for
	// providers that issue opaque ID tokens or none at all.
	session
		.id_token
		.as_ref()
		.and_then(|token| claims::decode_jwt_claims(token.expose()).ok())
		.as_ref()
		.and_then(UserIdentity::from_claims)
		.or_else(|| {
			claims::decode_jwt_claims(session.access_token.expose())
				.ok()
				.as_ref()
				.and_then(UserIdentity::from_claims)
		})
}
