//! Secret key storage.
//!
//! The vault is an opaque store of private keys keyed by their public key. It
//! is read during signing only; callers never hold a key longer than one
//! operation's scope.

use crate::wallet::types::WalletError;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

/// Key/value secret store keyed by public key.
#[async_trait::async_trait]
pub trait KeyVault: Send + Sync {
	async fn store_key(&self, public_key: &str, secret: &[u8]) -> Result<(), WalletError>;
	async fn retrieve_key(&self, public_key: &str) -> Result<Vec<u8>, WalletError>;
	async fn contains(&self, public_key: &str) -> bool;
}

/// File-based vault: one hex-encoded key file per public key.
pub struct FileKeyVault {
	data_dir: PathBuf,
}

impl FileKeyVault {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn key_filename(&self, public_key: &str) -> PathBuf {
		self.data_dir.join(format!("{}.key", public_key))
	}
}

#[async_trait::async_trait]
impl KeyVault for FileKeyVault {
	async fn store_key(&self, public_key: &str, secret: &[u8]) -> Result<(), WalletError> {
		tokio::fs::create_dir_all(&self.data_dir)
			.await
			.map_err(|e| {
				WalletError::secret_store(format!("Failed to create vault directory: {}", e))
			})?;

		let filename = self.key_filename(public_key);
		tokio::fs::write(&filename, hex::encode(secret))
			.await
			.map_err(|e| WalletError::secret_store(format!("Failed to write key file: {}", e)))?;

		info!("Stored key for {}", public_key);
		Ok(())
	}

	async fn retrieve_key(&self, public_key: &str) -> Result<Vec<u8>, WalletError> {
		let filename = self.key_filename(public_key);
		if !filename.exists() {
			return Err(WalletError::secret_store(format!(
				"no key stored for {}",
				public_key
			)));
		}

		let content = tokio::fs::read_to_string(&filename)
			.await
			.map_err(|e| WalletError::secret_store(format!("Failed to read key file: {}", e)))?;

		hex::decode(content.trim())
			.map_err(|e| WalletError::secret_store(format!("Corrupt key file: {}", e)))
	}

	async fn contains(&self, public_key: &str) -> bool {
		self.key_filename(public_key).exists()
	}
}

/// In-memory vault for tests and ephemeral use.
pub struct MemoryKeyVault {
	keys: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyVault {
	pub fn new() -> Self {
		Self {
			keys: Mutex::new(HashMap::new()),
		}
	}
}

impl Default for MemoryKeyVault {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl KeyVault for MemoryKeyVault {
	async fn store_key(&self, public_key: &str, secret: &[u8]) -> Result<(), WalletError> {
		self.keys
			.lock()
			.unwrap()
			.insert(public_key.to_string(), secret.to_vec());
		Ok(())
	}

	async fn retrieve_key(&self, public_key: &str) -> Result<Vec<u8>, WalletError> {
		self.keys
			.lock()
			.unwrap()
			.get(public_key)
			.cloned()
			.ok_or_else(|| {
				WalletError::secret_store(format!("no key stored for {}", public_key))
			})
	}

	async fn contains(&self, public_key: &str) -> bool {
		self.keys.lock().unwrap().contains_key(public_key)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn file_vault_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let vault = FileKeyVault::new(dir.path().to_path_buf());

		let secret = [3u8; 32];
		vault.store_key("PUB_K1_test", &secret).await.unwrap();
		assert!(vault.contains("PUB_K1_test").await);

		let loaded = vault.retrieve_key("PUB_K1_test").await.unwrap();
		assert_eq!(loaded, secret.to_vec());
	}

	#[tokio::test]
	async fn missing_key_reports_secret_store_error() {
		let dir = tempfile::tempdir().unwrap();
		let vault = FileKeyVault::new(dir.path().to_path_buf());
		let result = vault.retrieve_key("PUB_K1_absent").await;
		assert!(matches!(result, Err(WalletError::SecretStore { .. })));
	}
}
