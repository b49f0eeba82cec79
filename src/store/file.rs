//! Simple file-backed [`SessionStorage`] for desktop and CLI deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{PersistedTokens, SessionStorage, StoreError, StoreFuture},
};

/// Persists the token snapshot to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStorage {
	path: PathBuf,
	inner: Arc<RwLock<Option<PersistedTokens>>>,
}
impl FileStorage {
	/// Opens (or creates) storage at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<Option<PersistedTokens>, StoreError> {
		if !path.exists() {
			return Ok(None);
		}

		let metadata = path
			.metadata()
			.map_err(|e| StoreError::backend(format!("Failed to inspect {}: {e}", path.display())))?;

		if metadata.len() == 0 {
			return Ok(None);
		}

		let bytes = fs::read(path)
			.map_err(|e| StoreError::backend(format!("Failed to read {}: {e}", path.display())))?;
		let tokens = serde_json::from_slice(&bytes).map_err(|e| {
			StoreError::serialization(format!("Failed to parse {}: {e}", path.display()))
		})?;

		Ok(Some(tokens))
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| {
				StoreError::backend(format!(
					"Failed to create storage directory {}: {e}",
					parent.display(),
				))
			})?;
		}
		Ok(())
	}

	fn persist_locked(&self, contents: &PersistedTokens) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized = serde_json::to_vec_pretty(contents).map_err(|e| {
			StoreError::serialization(format!("Failed to serialize token snapshot: {e}"))
		})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| {
				StoreError::backend(format!("Failed to create {}: {e}", tmp_path.display()))
			})?;

			file.write_all(&serialized).map_err(|e| {
				StoreError::backend(format!("Failed to write {}: {e}", tmp_path.display()))
			})?;
			file.sync_all().map_err(|e| {
				StoreError::backend(format!("Failed to sync {}: {e}", tmp_path.display()))
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| {
			StoreError::backend(format!("Failed to replace {}: {e}", self.path.display()))
		})
	}

	fn remove_file(&self) -> Result<(), StoreError> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) =>
				Err(StoreError::backend(format!("Failed to remove {}: {e}", self.path.display()))),
		}
	}
}
impl SessionStorage for FileStorage {
	fn save(&self, tokens: PersistedTokens) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			self.persist_locked(&tokens)?;
			*guard = Some(tokens);

			Ok(())
		})
	}

	fn load(&self) -> StoreFuture<'_, Option<PersistedTokens>> {
		Box::pin(async move { Ok(self.inner.read().clone()) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			self.remove_file()?;
			*guard = None;

			Ok(())
		})
	}
}
