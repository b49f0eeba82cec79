//! Unverified claim extraction from JWT payloads and userinfo responses.
//!
//! Tokens are decoded for their claims only; signature verification is the
//! identity provider's and resource server's concern, not this client's.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, error::DecodingError};

/// Claims shared by JWT payloads and the userinfo response.
///
/// Fields the session manager does not consume are ignored during
/// deserialization.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClaimSet {
	/// Subject identifier.
	pub sub: Option<String>,
	/// Preferred username, when asserted.
	pub preferred_username: Option<String>,
	/// Display name, when asserted.
	pub name: Option<String>,
	/// Email address, when asserted.
	pub email: Option<String>,
	/// Expiry as seconds since the Unix epoch (JWT `exp`).
	pub exp: Option<i64>,
	/// Realm-level role container (Keycloak claim shape).
	pub realm_access: Option<RealmAccess>,
}

/// Nested `realm_access` claim carrying realm role names.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RealmAccess {
	/// Role names granted at the realm level.
	#[serde(default)]
	pub roles: Vec<String>,
}

/// Decodes the payload segment of a JWT without verifying its signature.
pub fn decode_jwt_claims(token: &str) -> Result<ClaimSet, DecodingError> {
	let payload = token
		.split('.')
		.nth(1)
		.ok_or_else(|| DecodingError::Claims { reason: "token is not a JWT".into() })?;
	let bytes = URL_SAFE_NO_PAD
		.decode(payload)
		.map_err(|e| DecodingError::Claims { reason: format!("payload is not base64url ({e})") })?;

	serde_json::from_slice(&bytes)
		.map_err(|e| DecodingError::Claims { reason: format!("payload is not a claim set ({e})") })
}

/// Reads the expiry instant from a JWT's `exp` claim, when decodable.
pub(crate) fn token_expiry(token: &str) -> Option<OffsetDateTime> {
	decode_jwt_claims(token)
		.ok()?
		.exp
		.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
}

/// Builds an unsigned JWT fixture for tests.
#[cfg(test)]
pub(crate) fn encode_jwt(payload: &serde_json::Value) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
	let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());

	format!("{header}.{body}.sig")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn decodes_keycloak_shaped_payloads() {
		let token = encode_jwt(&serde_json::json!({
			"sub": "user-1",
			"preferred_username": "jdoe",
			"email": "jdoe@example.com",
			"exp": 1_735_689_600,
			"realm_access": { "roles": ["viewer", "editor"] },
		}));
		let claims = decode_jwt_claims(&token).expect("JWT payload should decode.");

		assert_eq!(claims.sub.as_deref(), Some("user-1"));
		assert_eq!(claims.preferred_username.as_deref(), Some("jdoe"));
		assert_eq!(
			claims.realm_access.expect("Roles should be present.").roles,
			vec!["viewer", "editor"],
		);
	}

	#[test]
	fn missing_roles_claim_is_not_an_error() {
		let token = encode_jwt(&serde_json::json!({ "sub": "user-2", "exp": 1_735_689_600 }));
		let claims = decode_jwt_claims(&token).expect("JWT payload should decode.");

		assert!(claims.realm_access.is_none());
	}

	#[test]
	fn rejects_opaque_tokens_and_bad_encodings() {
		assert!(matches!(decode_jwt_claims("opaque"), Err(DecodingError::Claims { .. })));
		assert!(matches!(
			decode_jwt_claims("header.%%%.sig"),
			Err(DecodingError::Claims { .. }),
		));
	}

	#[test]
	fn expiry_reads_the_exp_claim() {
		let token = encode_jwt(&serde_json::json!({ "exp": 1_735_689_600 }));
		let expiry = token_expiry(&token).expect("Expiry should decode.");

		assert_eq!(expiry.unix_timestamp(), 1_735_689_600);
		assert!(token_expiry("opaque").is_none());
	}
}
