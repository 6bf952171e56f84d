//! Persistence for the canonical collections.
//!
//! This module provides the `StatePersistenceService`, which saves and restores
//! the canonical collections as one JSON document per collection under a data
//! directory. A repository trait abstracts the storage so tests can run against
//! a temporary directory. `save_all` persists the full current in-memory
//! snapshot; there is no cross-collection transactionality.

use crate::wallet::context::Stores;
use crate::wallet::events::Collection;
use crate::wallet::store::CollectionItem;
use crate::wallet::types::WalletError;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tracing::info;

/// Opaque key/value storage for persisted collections.
#[async_trait::async_trait]
pub trait CollectionRepository: Send + Sync {
	async fn save(&self, key: &str, content: String) -> Result<(), WalletError>;
	async fn load(&self, key: &str) -> Result<Option<String>, WalletError>;
}

/// File-based implementation of CollectionRepository
pub struct FileCollectionRepository {
	data_dir: PathBuf,
}

impl FileCollectionRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn collection_filename(&self, key: &str) -> PathBuf {
		self.data_dir.join(format!("{}.json", key))
	}
}

#[async_trait::async_trait]
impl CollectionRepository for FileCollectionRepository {
	async fn save(&self, key: &str, content: String) -> Result<(), WalletError> {
		tokio::fs::create_dir_all(&self.data_dir).await.map_err(|e| {
			WalletError::storage(format!("Failed to create data directory: {}", e))
		})?;

		let filename = self.collection_filename(key);
		tokio::fs::write(&filename, content).await.map_err(|e| {
			WalletError::storage(format!("Failed to write {:?}: {}", filename, e))
		})?;

		Ok(())
	}

	async fn load(&self, key: &str) -> Result<Option<String>, WalletError> {
		let filename = self.collection_filename(key);
		if !filename.exists() {
			return Ok(None);
		}

		let content = tokio::fs::read_to_string(&filename).await.map_err(|e| {
			WalletError::storage(format!("Failed to read {:?}: {}", filename, e))
		})?;

		Ok(Some(content))
	}
}

/// Service for saving and restoring the canonical collections.
pub struct StatePersistenceService {
	repository: Box<dyn CollectionRepository>,
}

impl StatePersistenceService {
	/// File-backed service rooted at the given data directory.
	pub fn new(data_dir: PathBuf) -> Self {
		Self {
			repository: Box::new(FileCollectionRepository::new(data_dir)),
		}
	}

	pub fn with_repository(repository: Box<dyn CollectionRepository>) -> Self {
		Self { repository }
	}

	pub async fn save_collection<T: Serialize>(
		&self,
		collection: Collection,
		items: &[T],
	) -> Result<(), WalletError> {
		let content = serde_json::to_string_pretty(items).map_err(|e| {
			WalletError::storage(format!("Failed to serialize {:?}: {}", collection, e))
		})?;
		self.repository.save(collection.storage_key(), content).await
	}

	pub async fn load_collection<T: DeserializeOwned>(
		&self,
		collection: Collection,
	) -> Result<Option<Vec<T>>, WalletError> {
		let Some(content) = self.repository.load(collection.storage_key()).await? else {
			return Ok(None);
		};

		let items = serde_json::from_str(&content).map_err(|e| {
			WalletError::storage(format!("Failed to parse {:?}: {}", collection, e))
		})?;
		Ok(Some(items))
	}

	/// Persist the full current in-memory snapshot of every collection.
	pub async fn save_all(&self, stores: &Stores) -> Result<(), WalletError> {
		self.save_collection(Collection::ChainProviders, &stores.chain_providers.all())
			.await?;
		self.save_collection(Collection::Accounts, &stores.accounts.all())
			.await?;
		self.save_collection(Collection::TokenContracts, &stores.token_contracts.all())
			.await?;
		self.save_collection(Collection::TokenBalances, &stores.token_balances.all())
			.await?;
		self.save_collection(
			Collection::TokenTransferActions,
			&stores.token_transfer_actions.all(),
		)
		.await?;
		self.save_collection(Collection::Contacts, &stores.contacts.all())
			.await?;
		self.save_collection(Collection::Sessions, &stores.sessions.all())
			.await?;

		info!("Persisted all canonical collections");
		Ok(())
	}

	/// Restore every collection that has a persisted snapshot.
	pub async fn load_all(&self, stores: &Stores) -> Result<(), WalletError> {
		self.restore(&stores.chain_providers, Collection::ChainProviders)
			.await?;
		self.restore(&stores.accounts, Collection::Accounts).await?;
		self.restore(&stores.token_contracts, Collection::TokenContracts)
			.await?;
		self.restore(&stores.token_balances, Collection::TokenBalances)
			.await?;
		self.restore(
			&stores.token_transfer_actions,
			Collection::TokenTransferActions,
		)
		.await?;
		self.restore(&stores.contacts, Collection::Contacts).await?;
		self.restore(&stores.sessions, Collection::Sessions).await?;

		info!("Restored persisted collections");
		Ok(())
	}

	async fn restore<T>(
		&self,
		store: &crate::wallet::store::Store<T>,
		collection: Collection,
	) -> Result<(), WalletError>
	where
		T: CollectionItem + Serialize + DeserializeOwned,
	{
		if let Some(items) = self.load_collection(collection).await? {
			store.replace_all(items);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wallet::context::Stores;
	use crate::wallet::events::ChangeEmitter;
	use crate::wallet::types::Contact;

	#[tokio::test]
	async fn save_and_restore_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let service = StatePersistenceService::new(dir.path().to_path_buf());

		let stores = Stores::new(ChangeEmitter::new());
		stores.contacts.merge(vec![Contact::bare("alice"), Contact::bare("bob")]);
		service.save_all(&stores).await.unwrap();

		let restored = Stores::new(ChangeEmitter::new());
		service.load_all(&restored).await.unwrap();
		assert_eq!(restored.contacts.len(), 2);
		assert_eq!(restored.contacts.all(), stores.contacts.all());
	}

	#[tokio::test]
	async fn loading_from_an_empty_directory_is_a_no_op() {
		let dir = tempfile::tempdir().unwrap();
		let service = StatePersistenceService::new(dir.path().to_path_buf());

		let stores = Stores::new(ChangeEmitter::new());
		service.load_all(&stores).await.unwrap();
		assert!(stores.accounts.is_empty());
		assert!(stores.contacts.is_empty());
	}
}
