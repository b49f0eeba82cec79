//! Pluggable persistence for session token material.
//!
//! Backends only ever see three opaque strings; expiry and scope are
//! re-derived from token claims on load.

pub mod file;
pub use file::FileStorage;

pub mod memory;
pub use memory::MemoryStorage;

// std
use std::{future::Future, pin::Pin};
// self
use crate::_prelude::*;

/// Boxed future type returned by [`SessionStorage`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Opaque token strings handed to persistence backends.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTokens {
	/// Access token value.
	pub access_token: String,
	/// Refresh token value, if any.
	pub refresh_token: Option<String>,
	/// Raw ID token, if any.
	pub id_token: Option<String>,
}
impl Debug for PersistedTokens {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PersistedTokens")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

/// Persistence capability injected into the session manager.
///
/// Implementations must be safe to call concurrently; the manager serializes
/// save/clear around its own session lock but restore may race external
/// writers.
pub trait SessionStorage: Send + Sync {
	/// Persists the given token snapshot, replacing any previous one.
	fn save(&self, tokens: PersistedTokens) -> StoreFuture<'_, ()>;

	/// Loads the previously saved snapshot, if one exists.
	fn load(&self) -> StoreFuture<'_, Option<PersistedTokens>>;

	/// Removes any persisted snapshot.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Errors surfaced by storage backends.
#[derive(Debug, ThisError)]
pub enum StoreError {
	/// Token snapshot could not be serialized or deserialized.
	#[error("Storage serialization failed: {message}.")]
	Serialization {
		/// Underlying serializer message.
		message: String,
	},
	/// Backend-specific failure (filesystem, platform keystore).
	#[error("Storage backend failed: {message}.")]
	Backend {
		/// Backend-specific failure message.
		message: String,
	},
}
impl StoreError {
	pub(crate) fn serialization(e: impl ToString) -> Self {
		Self::Serialization { message: e.to_string() }
	}

	pub(crate) fn backend(e: impl ToString) -> Self {
		Self::Backend { message: e.to_string() }
	}
}
