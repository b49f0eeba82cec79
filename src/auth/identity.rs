//! Identity claims derived from tokens or the userinfo endpoint.

// self
use crate::{_prelude::*, auth::claims::ClaimSet};

/// Identity asserted by the provider for the current session.
///
/// Recomputed whenever a new session is installed; never independently
/// mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
	/// Stable subject identifier (`sub`).
	pub subject: String,
	/// Preferred username or display name, when asserted.
	pub username: Option<String>,
	/// Email address, when asserted.
	pub email: Option<String>,
	/// Realm role names; empty when the provider asserts none.
	pub roles: BTreeSet<String>,
}
impl UserIdentity {
	/// Derives an identity from a claim set; `None` when `sub` is absent.
	pub fn from_claims(claims: &ClaimSet) -> Option<Self> {
		let subject = claims.sub.clone()?;
		let roles = claims
			.realm_access
			.as_ref()
			.map(|access| access.roles.iter().cloned().collect())
			.unwrap_or_default();

		Some(Self {
			subject,
			username: claims.preferred_username.clone().or_else(|| claims.name.clone()),
			email: claims.email.clone(),
			roles,
		})
	}

	/// Returns true if the identity carries the provided realm role.
	pub fn has_role(&self, role: &str) -> bool {
		self.roles.contains(role)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::claims::RealmAccess;

	#[test]
	fn identity_requires_a_subject() {
		assert!(UserIdentity::from_claims(&ClaimSet::default()).is_none());
	}

	#[test]
	fn roles_default_to_empty_and_username_falls_back_to_name() {
		let claims = ClaimSet {
			sub: Some("user-1".into()),
			name: Some("Jane Doe".into()),
			..ClaimSet::default()
		};
		let identity =
			UserIdentity::from_claims(&claims).expect("Identity derivation should succeed.");

		assert_eq!(identity.username.as_deref(), Some("Jane Doe"));
		assert!(identity.roles.is_empty());
		assert!(!identity.has_role("admin"));
	}

	#[test]
	fn realm_roles_populate_the_role_set() {
		let claims = ClaimSet {
			sub: Some("user-2".into()),
			preferred_username: Some("jdoe".into()),
			realm_access: Some(RealmAccess { roles: vec!["editor".into(), "viewer".into()] }),
			..ClaimSet::default()
		};
		let identity =
			UserIdentity::from_claims(&claims).expect("Identity derivation should succeed.");

		assert_eq!(identity.username.as_deref(), Some("jdoe"));
		assert!(identity.has_role("editor"));
		assert!(identity.has_role("viewer"));
	}
}
