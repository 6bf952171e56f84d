//! Scripted in-memory chain and history endpoints for tests.

use super::types::*;
use super::{ChainRpc, HistoryRpc};
use crate::transaction::SignedTransaction;
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub fn test_chain_info(chain_id: &str) -> ChainInfo {
    ChainInfo {
        chain_id: chain_id.to_string(),
        head_block_num: 4242,
        // 32-byte block id; bytes 8..12 feed the ref block prefix.
        head_block_id: "00001092aabbccdd01020304f5f6f7f8000000000000000000000000000000ff"
            .to_string(),
        head_block_time: NaiveDateTime::parse_from_str("2026-03-01T10:00:00", "%Y-%m-%dT%H:%M:%S")
            .unwrap(),
    }
}

/// Scripted chain endpoint. Configure before wrapping in an `Arc`.
pub struct MockChainRpc {
    pub info: ChainInfo,
    pub accounts: HashMap<String, AccountResult>,
    /// Rows keyed by `(code, lower_bound)`.
    pub table_rows: HashMap<(String, String), TableRows>,
    pub abis: HashMap<String, AbiDef>,
    pub abi_failures: HashSet<String>,
    pub pushed: Mutex<Vec<SignedTransaction>>,
    pub push_failure: bool,
}

impl MockChainRpc {
    pub fn new(chain_id: &str) -> Self {
        Self {
            info: test_chain_info(chain_id),
            accounts: HashMap::new(),
            table_rows: HashMap::new(),
            abis: HashMap::new(),
            abi_failures: HashSet::new(),
            pushed: Mutex::new(Vec::new()),
            push_failure: false,
        }
    }

    pub fn with_account(mut self, name: &str, result: AccountResult) -> Self {
        self.accounts.insert(name.to_string(), result);
        self
    }

    pub fn with_profile(mut self, profile_contract: &str, row: UserInfoRow) -> Self {
        let key = (profile_contract.to_string(), row.acc.clone());
        self.table_rows.insert(
            key,
            TableRows {
                rows: vec![serde_json::to_value(&row).unwrap()],
                more: false,
            },
        );
        self
    }

    pub fn with_abi(mut self, contract: &str, abi: AbiDef) -> Self {
        self.abis.insert(contract.to_string(), abi);
        self
    }

    pub fn failing_abi(mut self, contract: &str) -> Self {
        self.abi_failures.insert(contract.to_string());
        self
    }

    pub fn pushed_count(&self) -> usize {
        self.pushed.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ChainRpc for MockChainRpc {
    async fn get_info(&self) -> Result<ChainInfo, RpcError> {
        Ok(self.info.clone())
    }

    async fn get_account(&self, name: &str) -> Result<AccountResult, RpcError> {
        self.accounts
            .get(name)
            .cloned()
            .ok_or_else(|| RpcError::Malformed(format!("unknown account {}", name)))
    }

    async fn get_table_rows(&self, params: TableRowsParams) -> Result<TableRows, RpcError> {
        let key = (params.code.clone(), params.lower_bound.unwrap_or_default());
        Ok(self.table_rows.get(&key).cloned().unwrap_or_default())
    }

    async fn get_abi(&self, account: &str) -> Result<AbiDef, RpcError> {
        if self.abi_failures.contains(account) {
            return Err(RpcError::Malformed(format!("no ABI for {}", account)));
        }
        self.abis
            .get(account)
            .cloned()
            .ok_or_else(|| RpcError::Malformed(format!("no ABI for {}", account)))
    }

    async fn push_transaction(&self, signed: &SignedTransaction) -> Result<PushReceipt, RpcError> {
        if self.push_failure {
            return Err(RpcError::Status {
                status: 500,
                body: "push rejected".to_string(),
            });
        }
        let mut pushed = self.pushed.lock().unwrap();
        pushed.push(signed.clone());
        Ok(PushReceipt {
            transaction_id: format!("txid{:04}", pushed.len()),
            processed: Some(ProcessedReceipt { block_num: 4243 }),
        })
    }
}

/// Scripted history endpoint. Configure before wrapping in an `Arc`.
pub struct MockHistoryRpc {
    pub key_accounts: HashMap<String, Vec<String>>,
    pub balances: HashMap<String, Vec<TokenBalanceRow>>,
    /// Transfer rows keyed by `(account, contract)`.
    pub transfers: HashMap<(String, String), Vec<TransferRow>>,
    /// Contracts whose transfer-history fetch errors.
    pub transfer_failures: HashSet<String>,
}

impl MockHistoryRpc {
    pub fn new() -> Self {
        Self {
            key_accounts: HashMap::new(),
            balances: HashMap::new(),
            transfers: HashMap::new(),
            transfer_failures: HashSet::new(),
        }
    }

    pub fn with_key_accounts(mut self, public_key: &str, names: &[&str]) -> Self {
        self.key_accounts.insert(
            public_key.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
        self
    }

    pub fn with_balance(mut self, account: &str, contract: &str, amount: &str) -> Self {
        self.balances
            .entry(account.to_string())
            .or_default()
            .push(TokenBalanceRow {
                contract: contract.to_string(),
                amount: amount.to_string(),
            });
        self
    }

    pub fn with_transfer(mut self, account: &str, contract: &str, row: TransferRow) -> Self {
        self.transfers
            .entry((account.to_string(), contract.to_string()))
            .or_default()
            .push(row);
        self
    }

    pub fn failing_transfers(mut self, contract: &str) -> Self {
        self.transfer_failures.insert(contract.to_string());
        self
    }
}

pub fn transfer_row(tx_id: &str, from: &str, to: &str, quantity: &str) -> TransferRow {
    TransferRow {
        tx_id: tx_id.to_string(),
        action_ordinal: 1,
        from: from.to_string(),
        to: to.to_string(),
        quantity: quantity.to_string(),
        memo: String::new(),
        block_time: NaiveDateTime::parse_from_str("2026-02-20T08:30:00", "%Y-%m-%dT%H:%M:%S")
            .unwrap(),
    }
}

#[async_trait::async_trait]
impl HistoryRpc for MockHistoryRpc {
    async fn get_key_accounts(&self, public_key: &str) -> Result<Vec<String>, RpcError> {
        Ok(self
            .key_accounts
            .get(public_key)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|name| !name.contains('.'))
            .collect())
    }

    async fn get_token_balances(&self, account: &str) -> Result<Vec<TokenBalanceRow>, RpcError> {
        Ok(self.balances.get(account).cloned().unwrap_or_default())
    }

    async fn get_transfer_actions(
        &self,
        account: &str,
        contract: &str,
        _symbol: &str,
    ) -> Result<Vec<TransferRow>, RpcError> {
        if self.transfer_failures.contains(contract) {
            return Err(RpcError::Status {
                status: 502,
                body: "history shard unavailable".to_string(),
            });
        }
        Ok(self
            .transfers
            .get(&(account.to_string(), contract.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
