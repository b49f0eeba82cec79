//! Internal OAuth token-endpoint client built on the [`oauth2`] crate.

pub use oauth2;

// crates.io
use oauth2::{
	AuthUrl, AuthorizationCode, ClientId, EndpointNotSet, EndpointSet, ExtraTokenFields,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError,
	StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSet,
	error::{ConfigError, DecodingError, NetworkError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::Issuer,
};

type OidcTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;
type ConfiguredOidcClient = oauth2::Client<
	BasicErrorResponse,
	OidcTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;

/// Extra token-response fields carried by OpenID Connect providers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdTokenFields {
	/// Raw ID token JWT, when the `openid` scope was granted.
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

/// Endpoint the manager is currently talking to; used to label transport errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointKind {
	/// The issuer's token endpoint.
	Token,
	/// The issuer's userinfo endpoint.
	UserInfo,
	/// A resource-server API endpoint reached through the dispatcher.
	Api,
}
impl EndpointKind {
	/// Stable label used in error messages and telemetry.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Token => "token",
			Self::UserInfo => "userinfo",
			Self::Api => "api",
		}
	}
}

/// Maps HTTP transport failures into session [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a session error.
	fn map_transport_error(
		&self,
		endpoint: EndpointKind,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		endpoint: EndpointKind,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(endpoint, *inner),
			HttpClientError::Http(inner) => ConfigError::HttpRequest(inner).into(),
			HttpClientError::Io(inner) => NetworkError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_unknown_transport_error(meta),
		}
	}
}

pub(crate) struct TokenClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredOidcClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> TokenClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_issuer(
		issuer: &Issuer,
		client_id: &str,
		redirect_uri: &Url,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(issuer.endpoints.authorization.to_string()).map_err(
			|source| ConfigError::InvalidEndpoint { endpoint: "authorization", source },
		)?;
		let token_url = TokenUrl::new(issuer.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "token", source })?;
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidRedirect { source })?;
		// Public client with PKCE; no client secret is ever attached.
		let oauth_client = oauth2::Client::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		Ok(Self { oauth_client, http_client, error_mapper })
	}

	/// Exchanges an authorization code plus PKCE verifier for tokens.
	pub(crate) async fn exchange_code(&self, code: &str, pkce_verifier: &str) -> Result<TokenSet> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let response = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_owned()))
			.request_async(&instrumented)
			.await
			.map_err(|err| self.map_request_error(meta.take(), err))?;

		Ok(into_token_set(response))
	}

	/// Exchanges a refresh token for a new token set.
	pub(crate) async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let refresh_secret = RefreshToken::new(refresh_token.to_owned());
		let response = self
			.oauth_client
			.exchange_refresh_token(&refresh_secret)
			.request_async(&instrumented)
			.await
			.map_err(|err| self.map_request_error(meta.take(), err))?;

		Ok(into_token_set(response))
	}

	fn map_request_error(
		&self,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		let meta_ref = meta.as_ref();

		match err {
			RequestTokenError::ServerResponse(response) => {
				let message = match response.error_description() {
					Some(description) =>
						format!("{} ({description})", response.error().as_ref()),
					None => response.error().as_ref().to_owned(),
				};

				Error::TokenEndpoint { status: meta_status(meta_ref), message }
			},
			RequestTokenError::Request(error) =>
				self.error_mapper.map_transport_error(EndpointKind::Token, meta_ref, error),
			RequestTokenError::Parse(source, _body) =>
				DecodingError::TokenResponse { source, status: meta_status(meta_ref) }.into(),
			RequestTokenError::Other(message) =>
				Error::TokenEndpoint { status: meta_status(meta_ref), message },
		}
	}
}

fn into_token_set(response: OidcTokenResponse) -> TokenSet {
	let expires_in = response
		.expires_in()
		.and_then(|delta| i64::try_from(delta.as_secs()).ok())
		.map(Duration::seconds);
	let scope = response
		.scopes()
		.map(|scopes| scopes.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(" "));

	TokenSet {
		access_token: response.access_token().secret().to_owned(),
		refresh_token: response.refresh_token().map(|token| token.secret().to_owned()),
		id_token: response.extra_fields().id_token.clone(),
		expires_in,
		scope,
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(endpoint: EndpointKind, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return NetworkError::Timeout { endpoint: endpoint.as_str() }.into();
	}

	NetworkError::transport(endpoint.as_str(), err).into()
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	Error::TokenEndpoint {
		status: meta_status(meta),
		message: format!("HTTP client error occurred: {message}"),
	}
}

#[cfg(feature = "reqwest")]
fn map_unknown_transport_error(meta: Option<&ResponseMetadata>) -> Error {
	Error::TokenEndpoint {
		status: meta_status(meta),
		message: "HTTP client error occurred".into(),
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	#[cfg(feature = "reqwest")]
	use crate::http::ReqwestHttpClient;

	#[test]
	fn id_token_fields_deserialize_from_token_response_json() {
		let json = serde_json::json!({
			"access_token": "access",
			"token_type": "bearer",
			"expires_in": 300,
			"refresh_token": "refresh",
			"id_token": "header.payload.signature",
		});
		let response: OidcTokenResponse = serde_json::from_value(json)
			.expect("Token response with an id_token field should deserialize.");
		let set = into_token_set(response);

		assert_eq!(set.access_token, "access");
		assert_eq!(set.refresh_token.as_deref(), Some("refresh"));
		assert_eq!(set.id_token.as_deref(), Some("header.payload.signature"));
		assert_eq!(set.expires_in, Some(Duration::minutes(5)));
	}

	#[test]
	fn missing_expires_in_maps_to_none() {
		let json = serde_json::json!({
			"access_token": "access",
			"token_type": "bearer",
		});
		let response: OidcTokenResponse = serde_json::from_value(json)
			.expect("Token response without expires_in should deserialize.");
		let set = into_token_set(response);

		assert_eq!(set.expires_in, None);
		assert_eq!(set.id_token, None);
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn builds_pkce_client_without_secret() {
		let issuer = Issuer::keycloak(
			&Url::parse("https://sso.example.com").expect("Failed to parse issuer URL."),
			"demo",
		)
		.expect("Keycloak issuer derivation should succeed.");
		let redirect =
			Url::parse("https://app.example.com/callback").expect("Failed to parse redirect URI.");
		let result = <TokenClient<ReqwestHttpClient, ReqwestTransportErrorMapper>>::from_issuer(
			&issuer,
			"public-client",
			&redirect,
			Arc::new(ReqwestHttpClient::default()),
			Arc::new(ReqwestTransportErrorMapper),
		);

		assert!(result.is_ok());
	}
}
