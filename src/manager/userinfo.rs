//! UserInfo endpoint loader.

// crates.io
use oauth2::http::{
	StatusCode,
	header::{ACCEPT, HeaderValue},
};
// self
use crate::{
	_prelude::*,
	auth::{ClaimSet, UserIdentity},
	error::DecodingError,
	http::{ApiRequest, TokenHttpClient},
	manager::SessionManager,
	oauth::{EndpointKind, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<C, M> SessionManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Queries the issuer's userinfo endpoint with the current access token and
	/// replaces the cached identity with the response.
	///
	/// Claims fetched here take precedence over those decoded from tokens at
	/// install time. Requires an unexpired session; a 401 from the endpoint
	/// surfaces as [`Error::Unauthenticated`] without tearing the session down.
	pub async fn load_user_info(&self) -> Result<UserIdentity> {
		const KIND: FlowKind = FlowKind::UserInfo;

		let span = FlowSpan::new(KIND, "load_user_info");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let now = OffsetDateTime::now_utc();
				let (epoch, session) = {
					let state = self.state.read();

					(state.epoch, state.session.clone())
				};
				let session = session
					.filter(|session| session.is_active_at(now))
					.ok_or(Error::Unauthenticated)?;
				let request = ApiRequest::get(self.issuer.endpoints.userinfo.clone())
					.header(ACCEPT, HeaderValue::from_static("application/json"));
				let response = self
					.send_bearer(EndpointKind::UserInfo, &request, session.access_token.expose())
					.await?;

				match response.status() {
					StatusCode::UNAUTHORIZED => return Err(Error::Unauthenticated),
					status if !status.is_success() =>
						return Err(Error::TokenEndpoint {
							status: Some(status.as_u16()),
							message: "userinfo request was rejected".into(),
						}),
					_ => {},
				}

				let mut deserializer = serde_json::Deserializer::from_slice(response.body());
				let claims: ClaimSet = serde_path_to_error::deserialize(&mut deserializer)
					.map_err(|source| DecodingError::UserInfo { source })?;
				let identity = UserIdentity::from_claims(&claims).ok_or_else(|| {
					Error::from(DecodingError::Claims {
						reason: "userinfo response is missing the sub claim".into(),
					})
				})?;

				{
					let mut state = self.state.write();

					if state.epoch == epoch {
						state.identity = Some(identity.clone());
					}
				}

				Ok(identity)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}
