//! Transport primitives shared by token exchanges, userinfo loads, and
//! authenticated dispatch.
//!
//! The module exposes [`TokenHttpClient`] alongside [`ResponseMetadata`] and
//! [`ResponseMetadataSlot`] so downstream crates can integrate custom HTTP
//! clients without losing the manager's error-classification hooks.
//! Implementations call [`ResponseMetadataSlot::take`] before dispatching a
//! request and [`ResponseMetadataSlot::store`] once an HTTP status is known.

// std
use std::ops::Deref;
// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{
		Method, Request,
		header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
	},
};
// self
use crate::{_prelude::*, error::ConfigError};

/// Default request timeout applied by the bundled reqwest client.
///
/// The underlying protocol leaves the timeout unspecified; ten seconds is this
/// crate's documented default for token, userinfo, and dispatched API calls.
pub const DEFAULT_HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Abstraction over HTTP transports capable of executing OAuth token exchanges
/// and bearer-authenticated API calls.
///
/// The trait is the manager's only dependency on an HTTP stack. Callers provide
/// an implementation (typically behind `Arc<T>` where `T: TokenHttpClient`) and
/// the manager requests short-lived [`AsyncHttpClient`] handles that each carry
/// a clone of a [`ResponseMetadataSlot`]. Implementations must be
/// `Send + Sync + 'static` so they can be shared across manager instances, and
/// the handles they return must own whatever state is required so their request
/// futures remain `Send` for the lifetime of the in-flight operation.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// Implementations must call [`ResponseMetadataSlot::take`] before
	/// submitting the HTTP request so stale information never leaks across
	/// retries, and [`ResponseMetadataSlot::store`] once a response status is
	/// known.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Captures metadata from the most recent HTTP response for downstream error
/// mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the endpoint, if available.
	pub status: Option<u16>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and
/// error layers.
///
/// The manager creates a fresh slot for each request and reads the captured
/// metadata immediately after the transport resolves.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Outbound API request consumed by the authenticated dispatcher.
///
/// The dispatcher owns retry logic, so requests are plain data that can be
/// re-sent after a just-in-time refresh.
#[derive(Clone)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Target URL.
	pub url: Url,
	/// Extra headers; the dispatcher adds the `Authorization` header itself.
	pub headers: HeaderMap,
	/// Request body bytes.
	pub body: Vec<u8>,
}
impl ApiRequest {
	/// Creates a request with no extra headers and an empty body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: Vec::new() }
	}

	/// Convenience constructor for GET requests.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Appends a header.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.append(name, value);

		self
	}

	/// Replaces the request body.
	pub fn body(mut self, body: Vec<u8>) -> Self {
		self.body = body;

		self
	}

	pub(crate) fn to_http(&self, bearer: &str) -> Result<HttpRequest> {
		let mut request = Request::builder()
			.method(self.method.clone())
			.uri(self.url.as_str())
			.body(self.body.clone())
			.map_err(ConfigError::HttpRequest)?;

		request.headers_mut().extend(self.headers.clone());

		let value = HeaderValue::from_str(&format!("Bearer {bearer}"))
			.map_err(|e| ConfigError::HttpRequest(e.into()))?;

		request.headers_mut().insert(AUTHORIZATION, value);

		Ok(request)
	}
}
impl Debug for ApiRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiRequest")
			.field("method", &self.method)
			.field("url", &self.url)
			.field("headers", &self.headers.len())
			.field("body_len", &self.body.len())
			.finish()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one
/// place. Token requests should not follow redirects, matching OAuth 2.0
/// guidance that token endpoints return results directly; the bundled
/// constructor disables redirect following and applies [`DEFAULT_HTTP_TIMEOUT`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds the bundled client: ten-second timeout, redirects disabled.
	pub fn bounded() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.timeout(DEFAULT_HTTP_TIMEOUT)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConfigError::from)?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	///
	/// Callers supplying their own client own its timeout and redirect policy.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	pub(crate) fn instrumented(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle::new(self.0.clone(), slot)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

#[cfg(feature = "reqwest")]
struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

#[cfg(feature = "reqwest")]
/// Public handle returned by [`ReqwestHttpClient`] that satisfies [`TokenHttpClient`].
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl InstrumentedHandle {
	fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self(Arc::new(InstrumentedHttpClient { client, slot }))
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			client.slot.store(ResponseMetadata { status: Some(status.as_u16()) });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		self.instrumented(slot)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn metadata_slot_is_single_read() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(200) });

		assert_eq!(slot.take().and_then(|meta| meta.status), Some(200));
		assert!(slot.take().is_none());
	}

	#[test]
	fn api_request_attaches_bearer_header() {
		let request = ApiRequest::get(
			Url::parse("https://api.example.com/scenes").expect("Failed to parse test URL."),
		)
		.to_http("token-123")
		.expect("Bearer request construction should succeed.");
		let authorization = request
			.headers()
			.get(AUTHORIZATION)
			.expect("Authorization header should be attached.");

		assert_eq!(authorization.to_str().expect("Header should be ASCII."), "Bearer token-123");
	}
}
