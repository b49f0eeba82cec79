//! In-memory [`SessionStorage`] for tests and ephemeral sessions.

// self
use crate::{
	_prelude::*,
	store::{PersistedTokens, SessionStorage, StoreFuture},
};

/// Process-local storage backend; contents vanish on drop.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
	inner: Arc<RwLock<Option<PersistedTokens>>>,
}
impl MemoryStorage {
	/// Creates an empty in-memory storage.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the current snapshot without going through the async trait.
	pub fn snapshot(&self) -> Option<PersistedTokens> {
		self.inner.read().clone()
	}
}
impl SessionStorage for MemoryStorage {
	fn save(&self, tokens: PersistedTokens) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			*self.inner.write() = Some(tokens);

			Ok(())
		})
	}

	fn load(&self) -> StoreFuture<'_, Option<PersistedTokens>> {
		Box::pin(async move { Ok(self.inner.read().clone()) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			*self.inner.write() = None;

			Ok(())
		})
	}
}
