//!
//! Vault-backed transaction signing.
//!
//! The signer retrieves the private key for the signing account's permission
//! from the key vault, signs the transaction's chain-bound digest, and returns
//! the signed envelope. Keys live in the vault; they are fetched per signing
//! operation and never cached here.

use crate::transaction::builder::{SignedTransaction, Transaction};
use crate::vault::KeyVault;
use crate::wallet::types::WalletError;

use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use std::sync::Arc;
use tracing::debug;

/// Signs transactions with keys held in the vault.
#[derive(Clone)]
pub struct TransactionSigner {
    vault: Arc<dyn KeyVault>,
}

impl TransactionSigner {
    pub fn new(vault: Arc<dyn KeyVault>) -> Self {
        Self { vault }
    }

    /// Sign the transaction's digest for the given chain with the private key
    /// stored under `public_key`.
    pub async fn sign(
        &self,
        transaction: Transaction,
        chain_id: &str,
        public_key: &str,
    ) -> Result<SignedTransaction, WalletError> {
        let secret = self.vault.retrieve_key(public_key).await?;
        let signing_key = SigningKey::from_slice(&secret)
            .map_err(|e| WalletError::secret_store(format!("invalid stored key: {}", e)))?;

        let digest = transaction.signing_digest(chain_id);
        let signature: Signature = signing_key.sign(&digest);

        debug!("Signed transaction digest with key {}", public_key);

        Ok(SignedTransaction {
            signatures: vec![format_signature(&signature)],
            compression: "none".to_string(),
            transaction,
        })
    }
}

/// Render a signature in the chain's text form.
pub fn format_signature(signature: &Signature) -> String {
    format!("SIG_K1_{}", hex::encode(signature.to_bytes()))
}

/// Derive the text form of the public key belonging to a raw private key.
pub fn public_key_for_secret(secret: &[u8]) -> Result<String, WalletError> {
    let signing_key = SigningKey::from_slice(secret)
        .map_err(|e| WalletError::secret_store(format!("invalid private key: {}", e)))?;
    let point = signing_key.verifying_key().to_encoded_point(true);
    Ok(format!("PUB_K1_{}", hex::encode(point.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::test_chain_info;
    use crate::transaction::TransactionBuilder;
    use crate::vault::MemoryKeyVault;
    use k256::ecdsa::signature::Verifier;
    use k256::ecdsa::VerifyingKey;

    #[tokio::test]
    async fn signs_with_the_stored_key() {
        let secret = [7u8; 32];
        let public_key = public_key_for_secret(&secret).unwrap();

        let vault = Arc::new(MemoryKeyVault::new());
        vault.store_key(&public_key, &secret).await.unwrap();

        let transaction = TransactionBuilder::new()
            .with_chain_info(test_chain_info("chain"))
            .build()
            .unwrap();
        let digest = transaction.signing_digest("chain");

        let signer = TransactionSigner::new(vault);
        let signed = signer.sign(transaction, "chain", &public_key).await.unwrap();

        assert_eq!(signed.signatures.len(), 1);
        let encoded = signed.signatures[0].strip_prefix("SIG_K1_").unwrap();
        let signature = Signature::from_slice(&hex::decode(encoded).unwrap()).unwrap();

        let verifying_key = VerifyingKey::from(&SigningKey::from_slice(&secret).unwrap());
        verifying_key.verify(&digest, &signature).unwrap();
    }

    #[tokio::test]
    async fn missing_key_is_a_secret_store_error() {
        let vault = Arc::new(MemoryKeyVault::new());
        let transaction = TransactionBuilder::new()
            .with_chain_info(test_chain_info("chain"))
            .build()
            .unwrap();

        let signer = TransactionSigner::new(vault);
        let result = signer.sign(transaction, "chain", "PUB_K1_missing").await;
        assert!(matches!(result, Err(WalletError::SecretStore { .. })));
    }
}
