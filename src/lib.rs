//! Client-side OpenID Connect session manager: Authorization Code + PKCE login,
//! proactive and just-in-time refresh, pluggable token persistence, and
//! bearer-authenticated dispatch in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod error;
pub mod http;
pub mod manager;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::ScopeSet,
		http::ReqwestHttpClient,
		manager::SessionManager,
		oauth::ReqwestTransportErrorMapper,
		provider::Issuer,
		store::{MemoryStorage, SessionStorage},
	};

	/// Session manager type alias used by reqwest-backed integration tests.
	pub type ReqwestTestManager = SessionManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Constructs a [`SessionManager`] backed by in-memory storage and the reqwest transport
	/// used across integration tests.
	pub fn build_reqwest_test_manager(
		issuer: Issuer,
		client_id: &str,
		redirect_uri: Url,
		scopes: &[&str],
	) -> (ReqwestTestManager, Arc<MemoryStorage>) {
		let storage_backend = Arc::new(MemoryStorage::default());
		let storage: Arc<dyn SessionStorage> = storage_backend.clone();
		let scope = ScopeSet::new(scopes.iter().copied())
			.expect("Failed to build scope fixture for tests.");
		let manager = SessionManager::with_http_client(
			storage,
			issuer,
			client_id,
			redirect_uri,
			scope,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		);

		(manager, storage_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeSet,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
#[cfg(test)] use oidc_session as _;
