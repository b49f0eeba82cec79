//! Bearer-authenticated API dispatch with just-in-time refresh and a single
//! 401 retry.
//!
//! The dispatcher never sends a request it already knows will fail: an expired
//! session without a refresh token short-circuits to
//! [`Error::Unauthenticated`] with zero network calls. A 401 from the resource
//! server triggers exactly one deduplicated refresh and one retry; a second 401
//! tears the session down.

// crates.io
use oauth2::{AsyncHttpClient, HttpResponse, http::StatusCode};
// self
use crate::{
	_prelude::*,
	http::{ApiRequest, ResponseMetadataSlot, TokenHttpClient},
	manager::SessionManager,
	oauth::{EndpointKind, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<C, M> SessionManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Sends an API request with the current access token attached as a bearer
	/// header, refreshing beforehand (expired token) or afterwards (401
	/// response) as needed.
	pub async fn dispatch(&self, request: ApiRequest) -> Result<HttpResponse> {
		const KIND: FlowKind = FlowKind::Dispatch;

		let span = FlowSpan::new(KIND, "dispatch");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let now = OffsetDateTime::now_utc();
				let session = self.current_session().ok_or(Error::Unauthenticated)?;
				let access = if session.is_active_at(now) {
					session.access_token
				} else {
					if session.refresh_token.is_none() {
						return Err(Error::Unauthenticated);
					}

					self.refresh().await?;
					self.current_session().ok_or(Error::Unauthenticated)?.access_token
				};
				let response =
					self.send_bearer(EndpointKind::Api, &request, access.expose()).await?;

				if response.status() != StatusCode::UNAUTHORIZED {
					return Ok(response);
				}

				// The resource server rejected a token the manager thought was
				// valid. One refresh, one retry; a refresh-less session is dead.
				if self.current_session().and_then(|s| s.refresh_token).is_none() {
					self.teardown_current().await;

					return Err(Error::Unauthenticated);
				}

				self.refresh_since(Some(&access)).await?;

				let retry_access =
					self.current_session().ok_or(Error::Unauthenticated)?.access_token;
				let retry =
					self.send_bearer(EndpointKind::Api, &request, retry_access.expose()).await?;

				if retry.status() == StatusCode::UNAUTHORIZED {
					self.teardown_current().await;

					return Err(Error::Unauthenticated);
				}

				Ok(retry)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	pub(crate) async fn send_bearer(
		&self,
		endpoint: EndpointKind,
		request: &ApiRequest,
		bearer: &str,
	) -> Result<HttpResponse> {
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let http_request = request.to_http(bearer)?;

		handle.call(http_request).await.map_err(|err| {
			self.transport_mapper.map_transport_error(endpoint, meta.take().as_ref(), err)
		})
	}

	async fn teardown_current(&self) {
		let epoch = self.state.read().epoch;

		self.clear_session(epoch).await;
	}
}
