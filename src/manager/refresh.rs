//! Refresh orchestration: singleflight deduplication, proactive scheduling,
//! and teardown on failure.
//!
//! All refresh entry points funnel through one guard, so any number of
//! concurrent callers produce at most one token-endpoint POST. Callers on the
//! 401 path pass the access token they observed failing; if the session has
//! already rotated past it by the time the guard is acquired, the request is
//! satisfied without another POST.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	http::TokenHttpClient,
	manager::SessionManager,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// How long before expiry the proactive refresh fires.
pub const REFRESH_LEAD: Duration = Duration::seconds(60);
/// Floor applied to the proactive refresh delay for short-lived tokens.
pub const MIN_REFRESH_DELAY: Duration = Duration::seconds(30);

/// Computes the instant the proactive refresh timer should fire.
///
/// Normally [`REFRESH_LEAD`] before expiry; tokens shorter than the lead still
/// wait at least [`MIN_REFRESH_DELAY`] so a misconfigured issuer cannot drive a
/// tight refresh loop.
pub(crate) fn refresh_deadline(expires_at: OffsetDateTime, now: OffsetDateTime) -> OffsetDateTime {
	(expires_at - REFRESH_LEAD).max(now + MIN_REFRESH_DELAY)
}

impl<C, M> SessionManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Refreshes the session using its refresh token.
	///
	/// Deduplicated: if another refresh already ran while this call waited, and
	/// the installed token is not near expiry, no additional POST is made. A
	/// failed token-endpoint call tears the session down and leaves the manager
	/// logged out.
	pub async fn refresh(&self) -> Result<()> {
		self.refresh_since(None).await
	}

	pub(crate) async fn refresh_since(&self, observed_access: Option<&TokenSecret>) -> Result<()> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.refresh_metrics.record_attempt();

				let _singleflight = self.refresh_guard.lock().await;
				// Re-read under the guard: a refresh that completed while this
				// call waited may already satisfy it.
				let (epoch, session) = {
					let state = self.state.read();

					(state.epoch, state.session.clone())
				};
				let Some(session) = session else {
					self.refresh_metrics.record_failure();

					return Err(Error::Unauthenticated);
				};
				let now = OffsetDateTime::now_utc();
				let already_fresh = match observed_access {
					Some(observed) => session.access_token.expose() != observed.expose(),
					None => session.is_active_at(now) && session.remaining_at(now) > REFRESH_LEAD,
				};

				if already_fresh {
					self.refresh_metrics.record_success();

					return Ok(());
				}

				let Some(refresh_token) = session.refresh_token.as_ref() else {
					self.refresh_metrics.record_failure();

					return Err(Error::NoRefreshToken);
				};
				let client = self.token_client().inspect_err(|_| {
					self.refresh_metrics.record_failure();
				})?;
				let tokens = match client.refresh(refresh_token.expose()).await {
					Ok(tokens) => tokens,
					Err(err) => {
						self.refresh_metrics.record_failure();
						obs::warn_refresh_teardown(&err);
						self.clear_session(epoch).await;

						return Err(err);
					},
				};

				self.install_inner(tokens, Some(epoch)).await.inspect_err(|_| {
					self.refresh_metrics.record_failure();
				})?;
				self.refresh_metrics.record_success();

				Ok(())
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	// Tears down the session after a failed refresh, unless a logout or a new
	// install already moved the epoch forward.
	pub(crate) async fn clear_session(&self, expected_epoch: u64) {
		self.cancel_refresh_timer();

		let cleared = {
			let mut state = self.state.write();

			if state.epoch == expected_epoch {
				state.epoch += 1;
				state.session = None;
				state.identity = None;

				true
			} else {
				false
			}
		};

		if cleared {
			let _ = self.storage.clear().await;
		}
	}

	// Schedules the proactive refresh. A no-op outside a Tokio runtime, where
	// callers fall back to just-in-time refresh on dispatch.
	pub(crate) fn arm_refresh_timer(&self, expires_at: OffsetDateTime) {
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			return;
		};
		let now = OffsetDateTime::now_utc();
		let deadline = refresh_deadline(expires_at, now);
		let delay = std::time::Duration::try_from(deadline - now).unwrap_or_default();
		let manager = self.clone();
		let epoch = self.state.read().epoch;
		let task = runtime.spawn(async move {
			tokio::time::sleep(delay).await;

			// Own the timer slot before refreshing; the install performed by a
			// successful refresh re-arms the timer and must not abort this task.
			manager.refresh_timer.lock().take();

			if manager.state.read().epoch != epoch {
				return;
			}

			let _ = manager.refresh_since(None).await;
		});

		self.refresh_metrics.record_scheduled();

		if let Some(previous) = self.refresh_timer.lock().replace(task) {
			previous.abort();
		}
	}

	pub(crate) fn cancel_refresh_timer(&self) {
		if let Some(task) = self.refresh_timer.lock().take() {
			task.abort();
		}
	}
}
