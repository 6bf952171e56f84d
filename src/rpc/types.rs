//! Wire types for the chain and history endpoints.

use crate::wallet::types::Permission;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Chain head information from `get_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfo {
	pub chain_id: String,
	pub head_block_num: u64,
	pub head_block_id: String,
	pub head_block_time: NaiveDateTime,
}

/// Account state from `get_account`; only the fields the engine consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResult {
	pub account_name: String,
	#[serde(default)]
	pub permissions: Vec<Permission>,
}

/// Parameters for a generic `get_table_rows` scan.
#[derive(Debug, Clone, Serialize)]
pub struct TableRowsParams {
	pub code: String,
	pub scope: String,
	pub table: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub lower_bound: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub upper_bound: Option<String>,
	pub limit: u32,
	pub json: bool,
}

impl TableRowsParams {
	/// Scan for a single row keyed by account name.
	pub fn keyed(code: &str, scope: &str, table: &str, key: &str) -> Self {
		Self {
			code: code.to_string(),
			scope: scope.to_string(),
			table: table.to_string(),
			lower_bound: Some(key.to_string()),
			upper_bound: Some(key.to_string()),
			limit: 1,
			json: true,
		}
	}
}

/// Rows returned by `get_table_rows`; callers deserialize each row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableRows {
	pub rows: Vec<serde_json::Value>,
	#[serde(default)]
	pub more: bool,
}

/// On-chain user profile row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoRow {
	pub acc: String,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub avatar: Option<String>,
	#[serde(default)]
	pub verified: Option<bool>,
}

/// A field of an ABI struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbiField {
	pub name: String,
	#[serde(rename = "type")]
	pub type_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbiStruct {
	pub name: String,
	#[serde(default)]
	pub base: String,
	#[serde(default)]
	pub fields: Vec<AbiField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbiAction {
	pub name: String,
	#[serde(rename = "type")]
	pub type_name: String,
}

/// A contract's decoded ABI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbiDef {
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub structs: Vec<AbiStruct>,
	#[serde(default)]
	pub actions: Vec<AbiAction>,
}

impl AbiDef {
	/// The struct type an action decodes to, if the ABI declares the action.
	pub fn action_struct(&self, action: &str) -> Option<&AbiStruct> {
		let type_name = self
			.actions
			.iter()
			.find(|a| a.name == action)
			.map(|a| a.type_name.as_str())?;
		self.structs.iter().find(|s| s.name == type_name)
	}
}

/// Response of `get_abi`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbiResult {
	pub account_name: String,
	#[serde(default)]
	pub abi: Option<AbiDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedReceipt {
	pub block_num: u64,
}

/// Response of `push_transaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushReceipt {
	pub transaction_id: String,
	#[serde(default)]
	pub processed: Option<ProcessedReceipt>,
}

impl PushReceipt {
	pub fn block_num(&self) -> Option<u64> {
		self.processed.as_ref().map(|p| p.block_num)
	}
}

/// Response of the history service's `get_key_accounts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyAccounts {
	#[serde(default)]
	pub account_names: Vec<String>,
}

/// One token balance row from the history service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalanceRow {
	pub contract: String,
	/// Quantity string, e.g. `"1.2345 TOK"`.
	pub amount: String,
}

/// One transfer action row from the history service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRow {
	pub tx_id: String,
	pub action_ordinal: u32,
	pub from: String,
	pub to: String,
	/// Quantity string, e.g. `"1.2345 TOK"`.
	pub quantity: String,
	#[serde(default)]
	pub memo: String,
	pub block_time: NaiveDateTime,
}

/// Error types for chain and history endpoint calls.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("endpoint returned status {status}: {body}")]
	Status { status: u16, body: String },

	#[error("malformed response: {0}")]
	Malformed(String),
}

impl RpcError {
	/// Surface a chain endpoint failure through the wallet error taxonomy.
	pub fn into_chain_error(self) -> crate::wallet::types::WalletError {
		use crate::wallet::types::WalletError;
		match self {
			RpcError::Http(e) => WalletError::Transport(e),
			other => WalletError::chain(other.to_string()),
		}
	}

	/// Surface a history endpoint failure through the wallet error taxonomy.
	pub fn into_history_error(self) -> crate::wallet::types::WalletError {
		use crate::wallet::types::WalletError;
		match self {
			RpcError::Http(e) => WalletError::Transport(e),
			other => WalletError::history(other.to_string()),
		}
	}
}
