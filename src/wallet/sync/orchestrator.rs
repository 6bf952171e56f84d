//! Account sync orchestrator.
//!
//! This module defines the `SyncOrchestrator`, which drives the multi-step
//! refresh of one account's state against the configured chain provider and
//! merges every fetch into the canonical collections. The pipeline runs
//! strictly in stage order, with intra-stage fan-outs executed as a single
//! structured join:
//!
//! 1. Fetch the account's permissions and merge them.
//! 2. Fetch the on-chain profile (avatar, nickname, verified) and merge it.
//! 3. Fetch token balances, synthesizing a blacklisted placeholder contract for
//!    every balance whose token contract is not locally known.
//! 4. Fan out one transfer-history fetch per balance; merge the union.
//! 5. Derive distinct counterparties from all known transfer actions and fan
//!    out their profile fetches; merge contacts.
//! 6. Persist all collections and emit the sync-completed event.
//!
//! A hard failure in stage 1 or 2 aborts the account's pipeline. Failures
//! inside the stage-4 and stage-5 fan-outs are swallowed per item: an account
//! with some unreachable history still completes with partial data. That
//! best-effort policy is deliberate and load-bearing.

use crate::rpc::{ChainRpc, HistoryRpc, RpcError, TableRowsParams, TransferRow, UserInfoRow};
use crate::wallet::context::Stores;
use crate::wallet::events::{ChangeEmitter, ChangeEvent};
use crate::wallet::persistence::StatePersistenceService;
use crate::wallet::sync::scheduler::OperationScheduler;
use crate::wallet::types::{
    Account, Asset, ChainProvider, Contact, TokenBalance, TokenContract, TokenTransferAction,
    WalletError,
};

use futures::future::join_all;
use itertools::Itertools;
use std::sync::Arc;
use tracing::{info, warn};

/// Table holding user profile rows under the provider's profile contract.
const PROFILE_TABLE: &str = "usersinfo";

/// Outcome of a `sync_all` run. One account's failure never blocks another;
/// every failure is reported here instead.
#[derive(Default)]
pub struct SyncReport {
    pub synced: usize,
    pub failures: Vec<(String, WalletError)>,
}

impl SyncReport {
    /// Get a human-readable summary of the run.
    pub fn summary(&self) -> String {
        format!(
            "{} accounts synchronized{}",
            self.synced,
            if self.failures.is_empty() {
                String::new()
            } else {
                format!(", {} failed", self.failures.len())
            }
        )
    }
}

/// Coordinates the per-account refresh pipeline for one chain provider.
pub struct SyncOrchestrator {
    chain: Arc<dyn ChainRpc>,
    history: Arc<dyn HistoryRpc>,
    provider: ChainProvider,
    scheduler: OperationScheduler,
    stores: Arc<Stores>,
    persistence: Arc<StatePersistenceService>,
    emitter: ChangeEmitter,
}

impl SyncOrchestrator {
    pub fn new(
        chain: Arc<dyn ChainRpc>,
        history: Arc<dyn HistoryRpc>,
        provider: ChainProvider,
        scheduler: OperationScheduler,
        stores: Arc<Stores>,
        persistence: Arc<StatePersistenceService>,
        emitter: ChangeEmitter,
    ) -> Self {
        Self {
            chain,
            history,
            provider,
            scheduler,
            stores,
            persistence,
            emitter,
        }
    }

    /// Run the full refresh pipeline for one account.
    pub async fn sync_account(&self, name: &str) -> Result<(), WalletError> {
        info!("Starting sync for account {}", name);
        let chain_id = self.provider.chain_id.clone();

        // Stage 1: permissions. A failure here aborts the pipeline.
        let account_result = self
            .scheduler
            .concurrent(self.chain.get_account(name))
            .await
            .map_err(RpcError::into_chain_error)?;

        let mut account = Account::new(chain_id.clone(), account_result.account_name);
        account.permissions = account_result.permissions;
        self.stores.accounts.merge(vec![account]);

        // Stage 2: profile. A failure here aborts too; a missing row does not.
        let profile = self
            .scheduler
            .concurrent(fetch_user_info(&*self.chain, &self.provider, name))
            .await
            .map_err(RpcError::into_chain_error)?;

        if let Some(row) = profile {
            let mut account = Account::new(chain_id.clone(), name);
            account.nickname = row.name;
            account.avatar = row.avatar;
            account.verified = row.verified;
            self.stores.accounts.merge(vec![account]);
        }

        // Stage 3: balances, plus placeholder contracts for unknown tokens.
        let balance_rows = self
            .scheduler
            .concurrent(self.history.get_token_balances(name))
            .await
            .map_err(RpcError::into_history_error)?;

        let mut balances = Vec::new();
        let mut placeholders = Vec::new();
        for row in balance_rows {
            let amount = match Asset::parse(&row.amount) {
                Ok(amount) => amount,
                Err(e) => {
                    warn!("Skipping malformed balance row for {}: {}", name, e);
                    continue;
                }
            };

            let contract_key = (
                chain_id.clone(),
                row.contract.clone(),
                amount.symbol().to_string(),
            );
            if self.stores.token_contracts.get(&contract_key).is_none() {
                placeholders.push(TokenContract::placeholder(
                    &chain_id,
                    &row.contract,
                    amount.symbol(),
                    amount.precision(),
                ));
            }

            balances.push(TokenBalance {
                chain_id: chain_id.clone(),
                account: name.to_string(),
                contract: row.contract,
                amount,
            });
        }
        self.stores.token_contracts.merge(placeholders);
        self.stores.token_balances.merge(balances);

        // Stage 4: one transfer-history fetch per balance, joined as a batch.
        // Individual failures are swallowed; the merge takes whatever arrived.
        let owned_balances = self
            .stores
            .token_balances
            .filter(|b| b.chain_id == chain_id && b.account == name);

        let fetches = owned_balances.into_iter().map(|balance| {
            let scheduler = self.scheduler.clone();
            let history = self.history.clone();
            let account = name.to_string();
            async move {
                let result = scheduler
                    .concurrent(history.get_transfer_actions(
                        &account,
                        &balance.contract,
                        balance.amount.symbol(),
                    ))
                    .await;
                (balance, result)
            }
        });

        let mut actions = Vec::new();
        for (balance, result) in join_all(fetches).await {
            match result {
                Ok(rows) => {
                    for row in rows {
                        match convert_transfer_row(&chain_id, name, &balance.contract, row) {
                            Ok(action) => actions.push(action),
                            Err(e) => warn!("Skipping malformed transfer row: {}", e),
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Transfer history for {} on {} unavailable: {}",
                        name, balance.contract, e
                    );
                }
            }
        }
        self.stores.token_transfer_actions.merge(actions);

        // Stage 5: counterparties, in order of first appearance across all
        // known transfer actions. Profile failures degrade to bare contacts.
        let counterparties: Vec<String> = self
            .stores
            .token_transfer_actions
            .filter(|a| a.chain_id == chain_id)
            .iter()
            .map(|a| a.other().to_string())
            .filter(|other| other != name)
            .unique()
            .collect();

        let contact_fetches = counterparties.into_iter().map(|counterparty| {
            let scheduler = self.scheduler.clone();
            let chain = self.chain.clone();
            let provider = self.provider.clone();
            async move {
                let profile = scheduler
                    .concurrent(fetch_user_info(&*chain, &provider, &counterparty))
                    .await;
                (counterparty, profile)
            }
        });

        let contacts = join_all(contact_fetches)
            .await
            .into_iter()
            .map(|(counterparty, profile)| {
                let mut contact = Contact::bare(counterparty.clone());
                match profile {
                    Ok(Some(row)) => {
                        contact.nickname = row.name;
                        contact.avatar = row.avatar;
                        contact.verified = row.verified;
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Profile for contact {} unavailable: {}", counterparty, e),
                }
                contact
            })
            .collect();
        self.stores.contacts.merge(contacts);

        // Stage 6: persist and announce.
        self.persistence.save_all(&self.stores).await?;
        self.emitter.emit(ChangeEvent::SyncCompleted {
            chain_id,
            account: name.to_string(),
        });

        info!("Account {} synchronized", name);
        Ok(())
    }

    /// Refresh every known account on this provider's chain, sequentially.
    pub async fn sync_all(&self) -> SyncReport {
        let accounts = self
            .stores
            .accounts
            .filter(|a| a.chain_id == self.provider.chain_id);

        let mut report = SyncReport::default();
        for account in accounts {
            match self.sync_account(&account.name).await {
                Ok(()) => report.synced += 1,
                Err(e) => {
                    warn!("Sync failed for account {}: {}", account.name, e);
                    report.failures.push((account.name, e));
                }
            }
        }

        info!("Sync run complete: {}", report.summary());
        report
    }
}

/// Fetch one account's on-chain profile row, if it exists.
pub(crate) async fn fetch_user_info(
    chain: &dyn ChainRpc,
    provider: &ChainProvider,
    name: &str,
) -> Result<Option<UserInfoRow>, RpcError> {
    let params = TableRowsParams::keyed(
        &provider.profile_contract,
        &provider.profile_contract,
        PROFILE_TABLE,
        name,
    );
    let table = chain.get_table_rows(params).await?;

    match table.rows.into_iter().next() {
        Some(row) => {
            let row: UserInfoRow = serde_json::from_value(row)
                .map_err(|e| RpcError::Malformed(format!("profile row: {}", e)))?;
            // The scan is keyed but a sparse table can return the next row.
            Ok((row.acc == name).then_some(row))
        }
        None => Ok(None),
    }
}

fn convert_transfer_row(
    chain_id: &str,
    account: &str,
    contract: &str,
    row: TransferRow,
) -> Result<TokenTransferAction, WalletError> {
    let quantity = Asset::parse(&row.quantity)?;
    Ok(TokenTransferAction {
        chain_id: chain_id.to_string(),
        account: account.to_string(),
        contract: contract.to_string(),
        sent: row.from == account,
        from: row.from,
        to: row.to,
        quantity,
        memo: row.memo,
        tx_id: row.tx_id,
        action_ordinal: row.action_ordinal,
        date: row.block_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::{MockChainRpc, MockHistoryRpc, transfer_row};
    use crate::rpc::{AccountResult, UserInfoRow};
    use crate::wallet::events::ChangeEmitter;

    fn orchestrator(
        chain: MockChainRpc,
        history: MockHistoryRpc,
        data_dir: &std::path::Path,
    ) -> (SyncOrchestrator, Arc<Stores>) {
        let emitter = ChangeEmitter::new();
        let stores = Arc::new(Stores::new(emitter.clone()));
        let provider = ChainProvider {
            chain_id: "chain".into(),
            name: "Test Net".into(),
            rpc_url: "http://rpc.invalid".into(),
            history_url: "http://history.invalid".into(),
            profile_contract: "profiles".into(),
            system_symbol: "SYS".into(),
        };
        let orchestrator = SyncOrchestrator::new(
            Arc::new(chain),
            Arc::new(history),
            provider,
            OperationScheduler::new(4),
            stores.clone(),
            Arc::new(StatePersistenceService::new(data_dir.to_path_buf())),
            emitter,
        );
        (orchestrator, stores)
    }

    fn alice_on_chain() -> MockChainRpc {
        MockChainRpc::new("chain")
            .with_account(
                "alice",
                AccountResult {
                    account_name: "alice".into(),
                    permissions: vec![],
                },
            )
            .with_profile(
                "profiles",
                UserInfoRow {
                    acc: "alice".into(),
                    name: Some("Alice".into()),
                    avatar: None,
                    verified: Some(true),
                },
            )
    }

    #[tokio::test]
    async fn pipeline_merges_account_balances_history_and_contacts() {
        let dir = tempfile::tempdir().unwrap();
        let history = MockHistoryRpc::new()
            .with_balance("alice", "token.a", "1.0000 AAA")
            .with_transfer("alice", "token.a", transfer_row("tx1", "alice", "bob", "0.5000 AAA"))
            .with_transfer("alice", "token.a", transfer_row("tx2", "carol", "alice", "0.2500 AAA"));
        let (orchestrator, stores) = orchestrator(alice_on_chain(), history, dir.path());

        orchestrator.sync_account("alice").await.unwrap();

        let account = stores
            .accounts
            .get(&("chain".to_string(), "alice".to_string()))
            .unwrap();
        assert_eq!(account.nickname.as_deref(), Some("Alice"));
        assert_eq!(account.verified, Some(true));

        assert_eq!(stores.token_balances.len(), 1);
        assert_eq!(stores.token_transfer_actions.len(), 2);

        let sent = stores
            .token_transfer_actions
            .find(|a| a.tx_id == "tx1")
            .unwrap();
        assert!(sent.sent);
        let received = stores
            .token_transfer_actions
            .find(|a| a.tx_id == "tx2")
            .unwrap();
        assert!(!received.sent);

        // Counterparties in order of first appearance, without the owner.
        let contacts: Vec<String> = stores.contacts.all().into_iter().map(|c| c.name).collect();
        assert_eq!(contacts, vec!["bob".to_string(), "carol".to_string()]);
    }

    #[tokio::test]
    async fn unknown_contracts_get_blacklisted_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let history = MockHistoryRpc::new().with_balance("alice", "token.new", "9.99 NEW");
        let (orchestrator, stores) = orchestrator(alice_on_chain(), history, dir.path());

        orchestrator.sync_account("alice").await.unwrap();

        let placeholder = stores
            .token_contracts
            .get(&("chain".to_string(), "token.new".to_string(), "NEW".to_string()))
            .unwrap();
        assert!(placeholder.blacklisted);
        assert_eq!(placeholder.supply.unwrap().units(), 0);
        assert_eq!(placeholder.precision, 2);
    }

    #[tokio::test]
    async fn one_failing_history_fetch_leaves_the_other_balances_synced() {
        let dir = tempfile::tempdir().unwrap();
        let history = MockHistoryRpc::new()
            .with_balance("alice", "token.a", "1.0000 AAA")
            .with_balance("alice", "token.b", "2.0000 BBB")
            .with_balance("alice", "token.c", "3.0000 CCC")
            .with_transfer("alice", "token.a", transfer_row("tx1", "alice", "bob", "0.1000 AAA"))
            .with_transfer("alice", "token.c", transfer_row("tx2", "dave", "alice", "0.3000 CCC"))
            .failing_transfers("token.b");
        let (orchestrator, stores) = orchestrator(alice_on_chain(), history, dir.path());

        // The pipeline still completes, with partial history.
        orchestrator.sync_account("alice").await.unwrap();

        assert_eq!(stores.token_balances.len(), 3);
        let tx_ids: Vec<String> = stores
            .token_transfer_actions
            .all()
            .into_iter()
            .map(|a| a.tx_id)
            .collect();
        assert_eq!(tx_ids, vec!["tx1".to_string(), "tx2".to_string()]);
    }

    #[tokio::test]
    async fn stage_one_failure_aborts_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let chain = MockChainRpc::new("chain");
        let history = MockHistoryRpc::new().with_balance("ghost", "token.a", "1.0000 AAA");
        let (orchestrator, stores) = orchestrator(chain, history, dir.path());

        let result = orchestrator.sync_account("ghost").await;
        assert!(matches!(result, Err(WalletError::Chain { .. })));
        assert!(stores.token_balances.is_empty());
    }

    #[tokio::test]
    async fn sync_all_reports_per_account_failures_without_blocking_others() {
        let dir = tempfile::tempdir().unwrap();
        let history = MockHistoryRpc::new();
        let (orchestrator, stores) = orchestrator(alice_on_chain(), history, dir.path());

        stores.accounts.merge(vec![
            Account::new("chain", "alice"),
            Account::new("chain", "ghost"),
        ]);

        let report = orchestrator.sync_all().await;
        assert_eq!(report.synced, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "ghost");
    }

    #[tokio::test]
    async fn completed_sync_emits_the_completion_event() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _stores) = orchestrator(alice_on_chain(), MockHistoryRpc::new(), dir.path());

        let mut events = orchestrator.emitter.subscribe();
        orchestrator.sync_account("alice").await.unwrap();

        let mut completed = false;
        while let Ok(event) = events.try_recv() {
            if let ChangeEvent::SyncCompleted { account, .. } = event {
                assert_eq!(account, "alice");
                completed = true;
            }
        }
        assert!(completed);
    }
}
