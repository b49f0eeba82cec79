//! Issuer metadata consumed by the session manager.
//!
//! The identity provider is treated as a black box exposing four OpenID Connect
//! endpoints: authorize, token, userinfo, and (optionally) end-session. The
//! [`Issuer`] type validates those URLs up front so every later flow can use
//! them without re-checking.

// std
use std::net::IpAddr;
// self
use crate::_prelude::*;

/// Endpoint set declared by an OpenID Connect issuer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerEndpoints {
	/// Authorization endpoint the end-user is redirected to.
	pub authorization: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token: Url,
	/// UserInfo endpoint queried with a bearer access token.
	pub userinfo: Url,
	/// Optional end-session (logout) endpoint.
	pub end_session: Option<Url>,
}

/// Validated issuer metadata consumed by [`SessionManager`](crate::manager::SessionManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
	/// Endpoint definitions exposed by the issuer.
	pub endpoints: IssuerEndpoints,
}
impl Issuer {
	/// Creates a new builder with no endpoints configured.
	pub fn builder() -> IssuerBuilder {
		IssuerBuilder::default()
	}

	/// Derives the four endpoints from a Keycloak server URL and realm name.
	///
	/// Keycloak publishes its OpenID Connect endpoints under
	/// `{server}/realms/{realm}/protocol/openid-connect/`.
	pub fn keycloak(server_url: &Url, realm: &str) -> Result<Self, IssuerError> {
		let base = format!(
			"{}/realms/{realm}/protocol/openid-connect",
			server_url.as_str().trim_end_matches('/'),
		);
		let endpoint = |suffix: &str, endpoint: &'static str| {
			Url::parse(&format!("{base}/{suffix}"))
				.map_err(|source| IssuerError::InvalidUrl { endpoint, source })
		};

		Self::builder()
			.authorization_endpoint(endpoint("auth", "authorization")?)
			.token_endpoint(endpoint("token", "token")?)
			.userinfo_endpoint(endpoint("userinfo", "userinfo")?)
			.end_session_endpoint(endpoint("logout", "end_session")?)
			.build()
	}

	/// Builds the end-session redirect URL, if the issuer declares one.
	///
	/// Carries `client_id`, an optional `post_logout_redirect_uri`, and an
	/// optional `id_token_hint` as query parameters.
	pub fn end_session_url(
		&self,
		client_id: &str,
		post_logout_redirect_uri: Option<&Url>,
		id_token_hint: Option<&str>,
	) -> Option<Url> {
		let mut url = self.endpoints.end_session.clone()?;

		{
			let mut pairs = url.query_pairs_mut();

			pairs.append_pair("client_id", client_id);

			if let Some(redirect) = post_logout_redirect_uri {
				pairs.append_pair("post_logout_redirect_uri", redirect.as_str());
			}
			if let Some(hint) = id_token_hint {
				pairs.append_pair("id_token_hint", hint);
			}
		}

		Some(url)
	}
}

/// Error returned when issuer validation fails.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IssuerError {
	/// A required endpoint was not configured.
	#[error("Issuer is missing the {endpoint} endpoint.")]
	MissingEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
	},
	/// An endpoint uses plain HTTP towards a non-loopback host.
	#[error("Issuer endpoint `{endpoint}` must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Offending URL.
		url: String,
	},
	/// A derived endpoint URL could not be parsed.
	#[error("Derived {endpoint} endpoint URL is invalid.")]
	InvalidUrl {
		/// Endpoint label.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// Builder API for assembling [`Issuer`] values.
#[derive(Clone, Debug, Default)]
pub struct IssuerBuilder {
	authorization: Option<Url>,
	token: Option<Url>,
	userinfo: Option<Url>,
	end_session: Option<Url>,
}
impl IssuerBuilder {
	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token = Some(url);

		self
	}

	/// Sets the userinfo endpoint.
	pub fn userinfo_endpoint(mut self, url: Url) -> Self {
		self.userinfo = Some(url);

		self
	}

	/// Sets the optional end-session endpoint.
	pub fn end_session_endpoint(mut self, url: Url) -> Self {
		self.end_session = Some(url);

		self
	}

	/// Validates the endpoints and produces an [`Issuer`].
	pub fn build(self) -> Result<Issuer, IssuerError> {
		let authorization = require(self.authorization, "authorization")?;
		let token = require(self.token, "token")?;
		let userinfo = require(self.userinfo, "userinfo")?;

		validate_endpoint("authorization", &authorization)?;
		validate_endpoint("token", &token)?;
		validate_endpoint("userinfo", &userinfo)?;

		if let Some(end_session) = &self.end_session {
			validate_endpoint("end_session", end_session)?;
		}

		Ok(Issuer {
			endpoints: IssuerEndpoints {
				authorization,
				token,
				userinfo,
				end_session: self.end_session,
			},
		})
	}
}

fn require(url: Option<Url>, endpoint: &'static str) -> Result<Url, IssuerError> {
	url.ok_or(IssuerError::MissingEndpoint { endpoint })
}

// Plain HTTP is tolerated for loopback hosts only, matching local identity
// provider deployments.
fn validate_endpoint(endpoint: &'static str, url: &Url) -> Result<(), IssuerError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(IssuerError::InsecureEndpoint { endpoint, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host_str() {
		Some("localhost") => true,
		Some(host) => host.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false),
		None => false,
	}
}
