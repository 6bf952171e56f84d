//! Transaction builder
//!
//! This module provides a builder pattern for constructing transactions bound
//! to the current chain head.

use crate::rpc::ChainInfo;
use crate::transaction::TRANSACTION_EXPIRE_SECONDS;
use crate::wallet::types::PermissionLevel;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug, Serialize)]
pub enum TransactionError {
	#[error("Transaction validation error: {0}")]
	ValidationError(String),

	#[error("Malformed chain info: {0}")]
	MalformedChainInfo(String),

	#[error("Missing builder field: {0}")]
	MissingField(&'static str),
}

impl From<TransactionError> for crate::wallet::types::WalletError {
	fn from(error: TransactionError) -> Self {
		crate::wallet::types::WalletError::chain(error.to_string())
	}
}

/// One action of a transaction. The data payload stays in its decoded form;
/// binary ABI packing happens in the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxAction {
	pub account: String,
	pub name: String,
	pub authorization: Vec<PermissionLevel>,
	pub data: serde_json::Value,
}

/// A concrete transaction bound to a recent chain head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
	pub expiration: NaiveDateTime,
	pub ref_block_num: u16,
	pub ref_block_prefix: u32,
	pub actions: Vec<TxAction>,
}

impl Transaction {
	/// Digest signed for this transaction on the given chain:
	/// sha256(chain id, serialized transaction, 32 zero bytes).
	pub fn signing_digest(&self, chain_id: &str) -> [u8; 32] {
		let mut hasher = Sha256::new();
		hasher.update(chain_id.as_bytes());
		// Serialization of a value composed of plain fields cannot fail.
		hasher.update(serde_json::to_vec(self).unwrap_or_default());
		hasher.update([0u8; 32]);
		hasher.finalize().into()
	}
}

/// A transaction together with its signatures, ready to broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
	pub signatures: Vec<String>,
	pub compression: String,
	pub transaction: Transaction,
}

/// Builder for constructing transactions against fresh chain head info
pub struct TransactionBuilder {
	/// Head info the header is derived from
	chain_info: Option<ChainInfo>,
	/// Expiration window past the head block time
	expire_after: Duration,
	/// Actions in execution order
	actions: Vec<TxAction>,
}

impl TransactionBuilder {
	/// Creates a new transaction builder
	pub fn new() -> Self {
		Self {
			chain_info: None,
			expire_after: Duration::seconds(TRANSACTION_EXPIRE_SECONDS),
			actions: Vec::new(),
		}
	}

	/// Sets the chain head info the header is derived from
	pub fn with_chain_info(mut self, info: ChainInfo) -> Self {
		self.chain_info = Some(info);
		self
	}

	/// Overrides the default expiration window
	pub fn with_expire_after(mut self, window: Duration) -> Self {
		self.expire_after = window;
		self
	}

	/// Appends one action
	pub fn with_action(mut self, action: TxAction) -> Self {
		self.actions.push(action);
		self
	}

	/// Appends a batch of actions
	pub fn with_actions(mut self, actions: Vec<TxAction>) -> Self {
		self.actions.extend(actions);
		self
	}

	/// Builds the final transaction
	pub fn build(self) -> Result<Transaction, TransactionError> {
		let info = self
			.chain_info
			.ok_or(TransactionError::MissingField("chain_info"))?;

		log::debug!(
			"Building transaction against head block {} at {}",
			info.head_block_num,
			info.head_block_time
		);

		let ref_block_num = (info.head_block_num & 0xffff) as u16;
		let ref_block_prefix = ref_block_prefix(&info.head_block_id)?;

		let transaction = Transaction {
			expiration: info.head_block_time + self.expire_after,
			ref_block_num,
			ref_block_prefix,
			actions: self.actions,
		};

		log::debug!(
			"Built transaction with {} actions, expires {}",
			transaction.actions.len(),
			transaction.expiration
		);

		Ok(transaction)
	}
}

impl Default for TransactionBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Reference prefix: bytes 8..12 of the head block id, little endian.
fn ref_block_prefix(head_block_id: &str) -> Result<u32, TransactionError> {
	let bytes = hex::decode(head_block_id)
		.map_err(|e| TransactionError::MalformedChainInfo(format!("head block id: {}", e)))?;
	if bytes.len() < 12 {
		return Err(TransactionError::MalformedChainInfo(format!(
			"head block id too short: {} bytes",
			bytes.len()
		)));
	}
	let prefix: [u8; 4] = bytes[8..12]
		.try_into()
		.map_err(|_| TransactionError::MalformedChainInfo("head block id".to_string()))?;
	Ok(u32::from_le_bytes(prefix))
}
