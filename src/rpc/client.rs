//!
//! HTTP clients for the chain RPC and history endpoints.
//!
//! This module provides async clients for the configured chain provider. The
//! chain client speaks to the node's RPC API (`get_info`, `get_account`,
//! `get_table_rows`, `get_abi`, `push_transaction`); the history client speaks
//! to the provider's history service (key accounts, token balances, transfer
//! actions). Both are exposed through trait seams so the sync pipeline and the
//! signing-request engine can be driven against scripted implementations.
//!
//! Idempotent reads are retried with exponential backoff; `push_transaction`
//! mutates chain state and is never retried here.

use super::types::*;
use crate::transaction::SignedTransaction;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Read access to the chain RPC endpoint.
#[async_trait::async_trait]
pub trait ChainRpc: Send + Sync {
	/// Chain head block id and time.
	async fn get_info(&self) -> Result<ChainInfo, RpcError>;

	/// Account permissions and metadata.
	async fn get_account(&self, name: &str) -> Result<AccountResult, RpcError>;

	/// Generic table scan.
	async fn get_table_rows(&self, params: TableRowsParams) -> Result<TableRows, RpcError>;

	/// ABI definition for a contract account.
	async fn get_abi(&self, account: &str) -> Result<AbiDef, RpcError>;

	/// Broadcast a signed transaction.
	async fn push_transaction(&self, signed: &SignedTransaction) -> Result<PushReceipt, RpcError>;
}

/// Read access to the provider's history service.
#[async_trait::async_trait]
pub trait HistoryRpc: Send + Sync {
	/// Accounts associated with a public key. Names containing `.` are
	/// reserved system names and are filtered out of the result.
	async fn get_key_accounts(&self, public_key: &str) -> Result<Vec<String>, RpcError>;

	/// All token balances held by an account.
	async fn get_token_balances(&self, account: &str) -> Result<Vec<TokenBalanceRow>, RpcError>;

	/// Transfer history of one token balance.
	async fn get_transfer_actions(
		&self,
		account: &str,
		contract: &str,
		symbol: &str,
	) -> Result<Vec<TransferRow>, RpcError>;
}

fn read_backoff() -> ExponentialBackoff {
	ExponentialBackoff {
		max_elapsed_time: Some(Duration::from_secs(10)),
		..ExponentialBackoff::default()
	}
}

/// Whether a failed read is worth retrying.
fn classify(error: RpcError) -> backoff::Error<RpcError> {
	match &error {
		RpcError::Http(e) if e.is_timeout() || e.is_connect() => backoff::Error::transient(error),
		RpcError::Status { status, .. } if *status >= 500 => backoff::Error::transient(error),
		_ => backoff::Error::permanent(error),
	}
}

/// HTTP client for the chain RPC endpoint.
#[derive(Clone)]
pub struct ChainClient {
	http_client: Client,
	rpc_url: String,
}

impl ChainClient {
	pub fn new(rpc_url: String) -> Self {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			rpc_url,
		}
	}

	async fn execute<P, R>(&self, path: &str, params: &P) -> Result<R, RpcError>
	where
		P: Serialize + ?Sized,
		R: DeserializeOwned,
	{
		let url = format!("{}{}", self.rpc_url, path);
		debug!("POST {}", url);

		let response = self.http_client.post(&url).json(params).send().await?;
		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(RpcError::Status {
				status: status.as_u16(),
				body,
			});
		}

		Ok(response.json().await?)
	}

	async fn read<P, R>(&self, path: &str, params: &P) -> Result<R, RpcError>
	where
		P: Serialize + ?Sized,
		R: DeserializeOwned,
	{
		backoff::future::retry(read_backoff(), || async move {
			self.execute(path, params).await.map_err(classify)
		})
		.await
	}
}

#[async_trait::async_trait]
impl ChainRpc for ChainClient {
	async fn get_info(&self) -> Result<ChainInfo, RpcError> {
		self.read("/v1/chain/get_info", &json!({})).await
	}

	async fn get_account(&self, name: &str) -> Result<AccountResult, RpcError> {
		self.read("/v1/chain/get_account", &json!({ "account_name": name }))
			.await
	}

	async fn get_table_rows(&self, params: TableRowsParams) -> Result<TableRows, RpcError> {
		self.read("/v1/chain/get_table_rows", &params).await
	}

	async fn get_abi(&self, account: &str) -> Result<AbiDef, RpcError> {
		let result: AbiResult = self
			.read("/v1/chain/get_abi", &json!({ "account_name": account }))
			.await?;
		result
			.abi
			.ok_or_else(|| RpcError::Malformed(format!("account {} has no ABI", account)))
	}

	async fn push_transaction(&self, signed: &SignedTransaction) -> Result<PushReceipt, RpcError> {
		// State-mutating: a single attempt, no retry.
		self.execute("/v1/chain/push_transaction", signed).await
	}
}

/// HTTP client for the provider's history service.
#[derive(Clone)]
pub struct HistoryClient {
	http_client: Client,
	history_url: String,
}

impl HistoryClient {
	pub fn new(history_url: String) -> Self {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			history_url,
		}
	}

	async fn read<P, R>(&self, path: &str, params: &P) -> Result<R, RpcError>
	where
		P: Serialize + ?Sized,
		R: DeserializeOwned,
	{
		backoff::future::retry(read_backoff(), || async move {
			let url = format!("{}{}", self.history_url, path);
			debug!("POST {}", url);

			let result = async {
				let response = self.http_client.post(&url).json(params).send().await?;
				let status = response.status();
				if !status.is_success() {
					let body = response.text().await.unwrap_or_default();
					return Err(RpcError::Status {
						status: status.as_u16(),
						body,
					});
				}
				Ok(response.json().await?)
			}
			.await;

			result.map_err(classify)
		})
		.await
	}
}

#[async_trait::async_trait]
impl HistoryRpc for HistoryClient {
	async fn get_key_accounts(&self, public_key: &str) -> Result<Vec<String>, RpcError> {
		let result: KeyAccounts = self
			.read(
				"/v1/history/get_key_accounts",
				&json!({ "public_key": public_key }),
			)
			.await?;

		Ok(result
			.account_names
			.into_iter()
			.filter(|name| !name.contains('.'))
			.collect())
	}

	async fn get_token_balances(&self, account: &str) -> Result<Vec<TokenBalanceRow>, RpcError> {
		self.read("/v1/history/get_tokens", &json!({ "account": account }))
			.await
	}

	async fn get_transfer_actions(
		&self,
		account: &str,
		contract: &str,
		symbol: &str,
	) -> Result<Vec<TransferRow>, RpcError> {
		self.read(
			"/v1/history/get_transfer_actions",
			&json!({
				"account": account,
				"contract": contract,
				"symbol": symbol,
			}),
		)
		.await
	}
}
