//! The wallet context: the one explicit handle object for the whole engine.
//!
//! A `WalletContext` is constructed once at startup from configuration and
//! owns everything with a lifetime: the canonical collection stores, the
//! operation scheduler, the change emitter, the key vault, the per-chain RPC
//! handles, the persistence service, and the signing-request engine. Every
//! top-level operation (import, sync, transfer, request handling) hangs off
//! it; there is no process-wide global state anywhere in the engine.

use crate::config::Config;
use crate::esr::{AuthenticationGate, RequestDisposition, RequestEngine, SigningRequest};
use crate::rpc::{ChainClient, ChainRpc, HistoryClient, HistoryRpc, PushReceipt, RpcError};
use crate::transaction::signer::public_key_for_secret;
use crate::transaction::{TransactionBuilder, TransactionSigner, TxAction};
use crate::vault::KeyVault;
use crate::wallet::events::{ChangeEmitter, ChangeEvent, Collection};
use crate::wallet::persistence::StatePersistenceService;
use crate::wallet::store::Store;
use crate::wallet::sync::orchestrator::{SyncOrchestrator, SyncReport};
use crate::wallet::sync::scheduler::OperationScheduler;
use crate::wallet::types::{
    Account, Asset, ChainProvider, Contact, PermissionLevel, Session, TokenBalance, TokenContract,
    TokenTransferAction, ValidationError, WalletError,
};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// The canonical in-memory collections. All writes go through the stores,
/// which serialize mutation and emit change events.
pub struct Stores {
    pub chain_providers: Store<ChainProvider>,
    pub accounts: Store<Account>,
    pub token_contracts: Store<TokenContract>,
    pub token_balances: Store<TokenBalance>,
    pub token_transfer_actions: Store<TokenTransferAction>,
    pub contacts: Store<Contact>,
    pub sessions: Store<Session>,
}

impl Stores {
    pub fn new(emitter: ChangeEmitter) -> Self {
        Self {
            chain_providers: Store::new(emitter.clone()),
            accounts: Store::new(emitter.clone()),
            token_contracts: Store::new(emitter.clone()),
            token_balances: Store::new(emitter.clone()),
            token_transfer_actions: Store::new(emitter.clone()),
            contacts: Store::new(emitter.clone()),
            sessions: Store::new(emitter),
        }
    }
}

/// RPC endpoints for one configured chain provider.
#[derive(Clone)]
pub struct ChainHandles {
    pub provider: ChainProvider,
    pub chain: Arc<dyn ChainRpc>,
    pub history: Arc<dyn HistoryRpc>,
}

/// The engine's root object. See the module docs.
pub struct WalletContext {
    config: Config,
    handles: Arc<HashMap<String, ChainHandles>>,
    stores: Arc<Stores>,
    scheduler: OperationScheduler,
    emitter: ChangeEmitter,
    vault: Arc<dyn KeyVault>,
    persistence: Arc<StatePersistenceService>,
    signer: TransactionSigner,
    engine: RequestEngine,
    active_account: RwLock<Option<(String, String)>>,
}

impl WalletContext {
    /// Build a context with HTTP clients for every configured provider.
    pub fn new(config: Config, vault: Arc<dyn KeyVault>, gate: Arc<dyn AuthenticationGate>) -> Self {
        let handles = config
            .chain_providers
            .iter()
            .map(|provider| {
                (
                    provider.chain_id.clone(),
                    ChainHandles {
                        provider: provider.clone(),
                        chain: Arc::new(ChainClient::new(provider.rpc_url.clone())),
                        history: Arc::new(HistoryClient::new(provider.history_url.clone())),
                    },
                )
            })
            .collect();

        Self::with_handles(config, vault, gate, handles)
    }

    /// Build a context over explicit RPC handles. Tests inject scripted
    /// endpoints here.
    pub fn with_handles(
        config: Config,
        vault: Arc<dyn KeyVault>,
        gate: Arc<dyn AuthenticationGate>,
        handles: HashMap<String, ChainHandles>,
    ) -> Self {
        let emitter = ChangeEmitter::new();
        let stores = Arc::new(Stores::new(emitter.clone()));
        let scheduler = OperationScheduler::new(config.concurrent_fetch_limit);
        let persistence = Arc::new(StatePersistenceService::new(config.data_dir.clone()));
        let signer = TransactionSigner::new(vault.clone());
        let handles = Arc::new(handles);

        let engine = RequestEngine::new(
            handles.clone(),
            stores.clone(),
            scheduler.clone(),
            signer.clone(),
            persistence.clone(),
            emitter.clone(),
            gate,
        );

        let context = Self {
            config,
            handles,
            stores,
            scheduler,
            emitter,
            vault,
            persistence,
            signer,
            engine,
            active_account: RwLock::new(None),
        };

        // The configured providers are canonical from the start.
        context
            .stores
            .chain_providers
            .merge(context.config.chain_providers.clone());
        context
    }

    pub fn stores(&self) -> &Arc<Stores> {
        &self.stores
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ChangeEvent> {
        self.emitter.subscribe()
    }

    /// Restore all persisted collections and re-derive the active account.
    pub async fn restore(&self) -> Result<(), WalletError> {
        self.persistence.load_all(&self.stores).await?;
        // Persisted state never overrides the configured providers.
        self.stores
            .chain_providers
            .merge(self.config.chain_providers.clone());

        if self.active_account().is_none() {
            if let Some(account) = self.stores.accounts.all().into_iter().next() {
                self.set_active_account(&account.chain_id, &account.name)?;
            }
        }
        Ok(())
    }

    /// Persist the full current in-memory snapshot.
    pub async fn save(&self) -> Result<(), WalletError> {
        self.persistence.save_all(&self.stores).await
    }

    pub fn active_account(&self) -> Option<Account> {
        let key = self.active_account.read().unwrap().clone()?;
        self.stores.accounts.get(&key)
    }

    pub fn set_active_account(&self, chain_id: &str, name: &str) -> Result<(), WalletError> {
        let key = (chain_id.to_string(), name.to_string());
        let account = self
            .stores
            .accounts
            .get(&key)
            .ok_or_else(|| ValidationError::UnknownAccount {
                name: name.to_string(),
            })?;

        *self.active_account.write().unwrap() = Some(key);
        self.emitter.emit(ChangeEvent::ActiveAccountChanged {
            account: Some(account),
        });
        Ok(())
    }

    fn handles_for(&self, chain_id: &str) -> Result<&ChainHandles, WalletError> {
        self.handles
            .get(chain_id)
            .ok_or_else(|| ValidationError::MissingChainProvider {
                chain_id: chain_id.to_string(),
            }.into())
    }

    fn orchestrator_for(&self, chain_id: &str) -> Result<SyncOrchestrator, WalletError> {
        let handles = self.handles_for(chain_id)?;
        Ok(SyncOrchestrator::new(
            handles.chain.clone(),
            handles.history.clone(),
            handles.provider.clone(),
            self.scheduler.clone(),
            self.stores.clone(),
            self.persistence.clone(),
            self.emitter.clone(),
        ))
    }

    /// Import every account controlled by a private key.
    ///
    /// Derives the public key, asks the history service which accounts it
    /// controls, stores the key in the vault, and merges the accounts. The
    /// first imported account becomes active when none is set yet.
    pub async fn import_account(
        &self,
        chain_id: &str,
        private_key_hex: &str,
    ) -> Result<Vec<Account>, WalletError> {
        let handles = self.handles_for(chain_id)?;
        let secret = hex::decode(private_key_hex.trim())
            .map_err(|e| WalletError::secret_store(format!("invalid private key: {}", e)))?;
        let public_key = public_key_for_secret(&secret)?;

        let names = self
            .scheduler
            .concurrent(handles.history.get_key_accounts(&public_key))
            .await
            .map_err(RpcError::into_history_error)?;
        if names.is_empty() {
            warn!("Key {} controls no accounts on {}", public_key, chain_id);
        }

        self.vault.store_key(&public_key, &secret).await?;

        let accounts: Vec<Account> = names
            .iter()
            .map(|name| Account::new(chain_id, name.clone()))
            .collect();
        self.stores.accounts.merge(accounts.clone());

        if self.active_account().is_none() {
            if let Some(first) = accounts.first() {
                self.set_active_account(chain_id, &first.name)?;
            }
        }

        self.persistence
            .save_collection(Collection::Accounts, &self.stores.accounts.all())
            .await?;

        info!(
            "Imported {} account(s) for key {}",
            accounts.len(),
            public_key
        );
        Ok(accounts)
    }

    /// Run the full refresh pipeline for one account.
    pub async fn sync_account(&self, chain_id: &str, name: &str) -> Result<(), WalletError> {
        self.orchestrator_for(chain_id)?.sync_account(name).await
    }

    /// Refresh every known account on every configured chain, sequentially.
    /// One account's failure never blocks another.
    pub async fn sync_all(&self) -> Result<SyncReport, WalletError> {
        let mut report = SyncReport::default();
        for chain_id in self.handles.keys() {
            let chain_report = self.orchestrator_for(chain_id)?.sync_all().await;
            report.synced += chain_report.synced;
            report.failures.extend(chain_report.failures);
        }
        Ok(report)
    }

    /// Transfer tokens from the active account.
    ///
    /// The balance guard runs locally before any network call; the signed
    /// transaction goes through the sequential lane; on success an optimistic
    /// transfer action lands in history immediately rather than waiting for
    /// the next full sync.
    pub async fn transfer(
        &self,
        to: &str,
        quantity: Asset,
        memo: &str,
    ) -> Result<PushReceipt, WalletError> {
        let account = self
            .active_account()
            .ok_or(ValidationError::NoActiveAccount)?;
        let handles = self.handles_for(&account.chain_id)?;

        if quantity.units() <= 0 {
            return Err(ValidationError::MalformedQuantity {
                input: quantity.to_string(),
            }
            .into());
        }

        let balance = self
            .stores
            .token_balances
            .find(|b| {
                b.chain_id == account.chain_id
                    && b.account == account.name
                    && b.amount.same_token(&quantity)
            })
            .ok_or_else(|| ValidationError::UnknownToken {
                account: account.name.clone(),
                symbol: quantity.symbol().to_string(),
            })?;

        if balance.amount.units() < quantity.units() {
            return Err(ValidationError::InsufficientBalance {
                available: balance.amount.to_string(),
                requested: quantity.to_string(),
            }
            .into());
        }

        let public_key = account
            .key_for_permission("active")
            .ok_or_else(|| ValidationError::MissingActiveKey {
                name: account.name.clone(),
            })?
            .to_string();

        let info = self
            .scheduler
            .concurrent(handles.chain.get_info())
            .await
            .map_err(RpcError::into_chain_error)?;

        let transaction = TransactionBuilder::new()
            .with_chain_info(info)
            .with_action(TxAction {
                account: balance.contract.clone(),
                name: "transfer".to_string(),
                authorization: vec![PermissionLevel {
                    actor: account.name.clone(),
                    permission: "active".to_string(),
                }],
                data: serde_json::json!({
                    "from": account.name,
                    "to": to,
                    "quantity": quantity.to_string(),
                    "memo": memo,
                }),
            })
            .build()?;

        let signed = self
            .signer
            .sign(transaction, &account.chain_id, &public_key)
            .await?;

        let receipt = self
            .scheduler
            .sequential(handles.chain.push_transaction(&signed))
            .await
            .map_err(RpcError::into_chain_error)?;

        info!(
            "Transfer of {} to {} accepted as {}",
            quantity, to, receipt.transaction_id
        );

        // Optimistic local history record.
        self.stores.token_transfer_actions.merge(vec![TokenTransferAction {
            chain_id: account.chain_id.clone(),
            account: account.name.clone(),
            contract: balance.contract,
            from: account.name.clone(),
            to: to.to_string(),
            quantity,
            memo: memo.to_string(),
            tx_id: receipt.transaction_id.clone(),
            action_ordinal: 1,
            date: Utc::now().naive_utc(),
            sent: true,
        }]);
        self.persistence
            .save_collection(
                Collection::TokenTransferActions,
                &self.stores.token_transfer_actions.all(),
            )
            .await?;

        Ok(receipt)
    }

    /// Take an inbound signing-request URI in flight.
    pub async fn handle_request(&self, uri: &str) -> Result<SigningRequest, WalletError> {
        self.engine.handle_uri(uri, self.active_account()).await
    }

    /// Accept the in-flight signing request.
    pub async fn accept_request(&self) -> Result<RequestDisposition, WalletError> {
        self.engine.accept().await
    }

    /// Decline the in-flight signing request.
    pub async fn decline_request(&self) -> Result<(), WalletError> {
        self.engine.decline().await
    }

    /// Sessions granted by previously accepted identity requests.
    pub fn sessions(&self) -> Vec<Session> {
        self.engine.sessions().list()
    }

    /// Revoke a granted session.
    pub async fn revoke_session(&self, sid: &str) -> Result<Session, WalletError> {
        self.engine.sessions().revoke(sid).await
    }
}
