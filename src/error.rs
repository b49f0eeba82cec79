//! Session-level error types shared across login, refresh, and dispatch paths.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical session error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error(transparent)]
	Storage(#[from] crate::store::StoreError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// A provider response could not be decoded.
	#[error(transparent)]
	Decoding(#[from] DecodingError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Network(#[from] NetworkError),

	/// The callback `state` does not match the pending login attempt.
	#[error("Authorization callback state does not match the pending login attempt.")]
	StateMismatch,
	/// The provider returned an `error` parameter instead of an authorization code.
	#[error("Authorization was denied by the provider: {error}.")]
	AuthorizationDenied {
		/// OAuth error code returned via the redirect.
		error: String,
		/// Optional human-readable description returned via the redirect.
		description: Option<String>,
	},
	/// The callback carries neither an authorization code nor an error.
	#[error("Authorization callback is malformed: {reason}.")]
	MalformedCallback {
		/// Explanation of what was missing or unexpected.
		reason: String,
	},
	/// A provider endpoint rejected the request.
	#[error("Provider endpoint returned an error response: {message}.")]
	TokenEndpoint {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Provider-supplied message summarizing the failure.
		message: String,
	},
	/// No live session (or no unexpired access token) is available.
	#[error("No authenticated session is available.")]
	Unauthenticated,
	/// The current session carries no refresh token.
	#[error("Session has no refresh token.")]
	NoRefreshToken,
}

/// Configuration and validation failures raised by the session manager.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Issuer declares an invalid endpoint URL.
	#[error("Issuer endpoint `{endpoint}` is invalid.")]
	InvalidEndpoint {
		/// Endpoint label (authorization, token, userinfo, end_session).
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Session builder validation failed.
	#[error("Unable to build auth session.")]
	SessionBuild(#[from] crate::auth::SessionBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures decoding provider responses or token claims.
#[derive(Debug, ThisError)]
pub enum DecodingError {
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// UserInfo endpoint responded with malformed JSON.
	#[error("UserInfo endpoint returned malformed JSON.")]
	UserInfo {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
	},
	/// A JWT payload (or claim within it) could not be decoded.
	#[error("Token claims could not be decoded: {reason}.")]
	Claims {
		/// Explanation of the decode failure.
		reason: String,
	},
	/// Neither `expires_in` nor a decodable `exp` claim was available.
	#[error("Token response carries no usable expiry.")]
	MissingExpiry,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum NetworkError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the {endpoint} endpoint.")]
	Transport {
		/// Endpoint label the request targeted.
		endpoint: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request exceeded the configured timeout.
	#[error("Request timed out while calling the {endpoint} endpoint.")]
	Timeout {
		/// Endpoint label the request targeted.
		endpoint: &'static str,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl NetworkError {
	/// Wraps a transport-specific network error.
	pub fn transport(
		endpoint: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Transport { endpoint, source: Box::new(src) }
	}
}
