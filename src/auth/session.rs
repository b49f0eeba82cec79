//! Token set and installed-session models with lifecycle helpers.

// self
use crate::{
	_prelude::*,
	auth::{
		claims,
		scope::ScopeSet,
		secret::TokenSecret,
	},
	error::DecodingError,
	store::PersistedTokens,
};

/// Raw token material returned by the token endpoint.
#[derive(Clone)]
pub struct TokenSet {
	/// Access token value.
	pub access_token: String,
	/// Refresh token value, if the provider issued one.
	pub refresh_token: Option<String>,
	/// Raw ID token JWT, if the provider issued one.
	pub id_token: Option<String>,
	/// Relative expiry, when the response carried `expires_in`.
	pub expires_in: Option<Duration>,
	/// Space-delimited scope string returned by the provider, if any.
	pub scope: Option<String>,
}
impl Debug for TokenSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSet")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Errors produced by [`AuthSessionBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum SessionBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// The one live authenticated session held by a session manager.
///
/// All three tokens are replaced atomically on refresh; a session is never
/// observed half-updated.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthSession {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Raw ID token, if the provider issued one.
	pub id_token: Option<TokenSecret>,
	/// Instant the session was installed.
	pub issued_at: OffsetDateTime,
	/// Expiry instant derived from `expires_in` or the access token's `exp` claim.
	pub expires_at: OffsetDateTime,
	/// Scopes granted to this session.
	pub scope: ScopeSet,
}
impl AuthSession {
	/// Returns a builder for constructing sessions.
	pub fn builder(scope: ScopeSet) -> AuthSessionBuilder {
		AuthSessionBuilder::new(scope)
	}

	/// Derives a session from a token-endpoint response.
	///
	/// Expiry preference: `expires_in`, else the access token's JWT `exp`
	/// claim. A non-positive `expires_in` yields an already-expired session
	/// rather than an error, so callers observe `is_active_at == false`.
	pub fn from_token_set(
		set: &TokenSet,
		requested_scope: &ScopeSet,
		issued_at: OffsetDateTime,
	) -> Result<Self> {
		let expires_at = match set.expires_in {
			Some(delta) => issued_at + delta,
			None => claims::token_expiry(&set.access_token)
				.ok_or(DecodingError::MissingExpiry)?,
		};
		let scope = match &set.scope {
			Some(raw) => ScopeSet::parse(raw).map_err(crate::error::ConfigError::from)?,
			None => requested_scope.clone(),
		};
		let mut builder = Self::builder(scope)
			.access_token(set.access_token.clone())
			.issued_at(issued_at)
			.expires_at(expires_at);

		if let Some(refresh) = &set.refresh_token {
			builder = builder.refresh_token(refresh.clone());
		}
		if let Some(id) = &set.id_token {
			builder = builder.id_token(id.clone());
		}

		builder.build().map_err(|e| crate::error::ConfigError::from(e).into())
	}

	/// Rebuilds a session from persisted token strings.
	///
	/// Expiry is re-derived from the access token's `exp` claim; a token
	/// without a decodable expiry is treated as already expired so restore
	/// paths fall through to refresh or teardown.
	pub fn from_persisted(
		tokens: &PersistedTokens,
		scope: ScopeSet,
		now: OffsetDateTime,
	) -> Option<Self> {
		if tokens.access_token.is_empty() {
			return None;
		}

		let expires_at =
			claims::token_expiry(&tokens.access_token).unwrap_or(OffsetDateTime::UNIX_EPOCH);
		let mut builder = Self::builder(scope)
			.access_token(tokens.access_token.clone())
			.issued_at(now)
			.expires_at(expires_at);

		if let Some(refresh) = &tokens.refresh_token {
			builder = builder.refresh_token(refresh.clone());
		}
		if let Some(id) = &tokens.id_token {
			builder = builder.id_token(id.clone());
		}

		builder.build().ok()
	}

	/// Returns true if the access token is still valid at the provided instant.
	pub fn is_active_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}

	/// Returns true if the access token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		!self.is_active_at(instant)
	}

	/// Remaining lifetime at the provided instant; negative once expired.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at - instant
	}

	/// Returns the three opaque token strings the persistence hook stores.
	pub fn persisted(&self) -> PersistedTokens {
		PersistedTokens {
			access_token: self.access_token.expose().to_owned(),
			refresh_token: self.refresh_token.as_ref().map(|t| t.expose().to_owned()),
			id_token: self.id_token.as_ref().map(|t| t.expose().to_owned()),
		}
	}
}
impl Debug for AuthSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthSession")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Builder for [`AuthSession`].
#[derive(Clone, Debug)]
pub struct AuthSessionBuilder {
	scope: ScopeSet,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	id_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl AuthSessionBuilder {
	fn new(scope: ScopeSet) -> Self {
		Self {
			scope,
			access_token: None,
			refresh_token: None,
			id_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.access_token = Some(token.into());

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Provides the ID token value.
	pub fn id_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.id_token = Some(token.into());

		self
	}

	/// Consumes the builder and produces an [`AuthSession`].
	pub fn build(self) -> Result<AuthSession, SessionBuilderError> {
		let access_token = self.access_token.ok_or(SessionBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(SessionBuilderError::MissingExpiry),
		};

		Ok(AuthSession {
			access_token,
			refresh_token: self.refresh_token,
			id_token: self.id_token,
			issued_at,
			expires_at,
			scope: self.scope,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::claims::encode_jwt;

	fn scope() -> ScopeSet {
		ScopeSet::new(["openid", "profile"]).expect("Scope fixture should be valid.")
	}

	#[test]
	fn builder_requires_access_token_and_expiry() {
		let err = AuthSession::builder(scope())
			.expires_in(Duration::minutes(5))
			.build()
			.expect_err("Builder should require an access token.");

		assert_eq!(err, SessionBuilderError::MissingAccessToken);

		let err = AuthSession::builder(scope())
			.access_token("access")
			.build()
			.expect_err("Builder should require an expiry.");

		assert_eq!(err, SessionBuilderError::MissingExpiry);
	}

	#[test]
	fn relative_expiry_is_anchored_at_issued_at() {
		let session = AuthSession::builder(scope())
			.access_token("access")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::minutes(30))
			.build()
			.expect("Session builder should support relative expiry.");

		assert_eq!(session.expires_at, macros::datetime!(2025-01-01 00:30 UTC));
		assert!(session.is_active_at(macros::datetime!(2025-01-01 00:29 UTC)));
		assert!(session.is_expired_at(macros::datetime!(2025-01-01 00:30 UTC)));
	}

	#[test]
	fn token_set_with_non_positive_expiry_installs_expired() {
		let now = OffsetDateTime::now_utc();
		let set = TokenSet {
			access_token: "access".into(),
			refresh_token: None,
			id_token: None,
			expires_in: Some(Duration::ZERO),
			scope: None,
		};
		let session = AuthSession::from_token_set(&set, &scope(), now)
			.expect("Session derivation should succeed for zero expiry.");

		assert!(session.is_expired_at(now));
	}

	#[test]
	fn missing_expires_in_falls_back_to_the_exp_claim() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let access = encode_jwt(&serde_json::json!({
			"sub": "user-1",
			"exp": now.unix_timestamp() + 300,
		}));
		let set = TokenSet {
			access_token: access,
			refresh_token: Some("refresh".into()),
			id_token: None,
			expires_in: None,
			scope: Some("openid profile".into()),
		};
		let session = AuthSession::from_token_set(&set, &scope(), now)
			.expect("Session derivation should fall back to the exp claim.");

		assert_eq!(session.remaining_at(now), Duration::minutes(5));
		assert_eq!(session.scope, scope());
	}

	#[test]
	fn opaque_token_without_any_expiry_is_rejected() {
		let set = TokenSet {
			access_token: "opaque".into(),
			refresh_token: None,
			id_token: None,
			expires_in: None,
			scope: None,
		};
		let err = AuthSession::from_token_set(&set, &scope(), OffsetDateTime::now_utc())
			.expect_err("Derivation should fail without any usable expiry.");

		assert!(matches!(err, Error::Decoding(DecodingError::MissingExpiry)));
	}

	#[test]
	fn persisted_layout_round_trips_token_values() {
		let now = OffsetDateTime::now_utc();
		let session = AuthSession::builder(scope())
			.access_token("access")
			.refresh_token("refresh")
			.id_token("id")
			.issued_at(now)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Session fixture should build.");
		let persisted = session.persisted();

		assert_eq!(persisted.access_token, "access");
		assert_eq!(persisted.refresh_token.as_deref(), Some("refresh"));
		assert_eq!(persisted.id_token.as_deref(), Some("id"));
	}

	#[test]
	fn restore_without_decodable_expiry_is_treated_as_expired() {
		let now = OffsetDateTime::now_utc();
		let persisted = PersistedTokens {
			access_token: "opaque".into(),
			refresh_token: Some("refresh".into()),
			id_token: None,
		};
		let session = AuthSession::from_persisted(&persisted, scope(), now)
			.expect("Restore should produce a session when an access token exists.");

		assert!(session.is_expired_at(now));
		assert!(
			AuthSession::from_persisted(
				&PersistedTokens {
					access_token: String::new(),
					refresh_token: None,
					id_token: None,
				},
				scope(),
				now,
			)
			.is_none(),
		);
	}
}
