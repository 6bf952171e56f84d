//! Change notifications for the canonical collections.
//!
//! Every mutation of a canonical collection announces itself twice: a pre-change
//! event naming the collection about to move, and a post-change event carrying a
//! read-only snapshot of the new contents. The emitter is owned by the wallet
//! context and handed to every store; observers subscribe with an explicit
//! lifetime and receive cloned snapshots, never a live mutable handle.

use crate::esr::SigningRequest;
use crate::wallet::types::{
    Account, ChainProvider, Contact, Session, TokenBalance, TokenContract, TokenTransferAction,
};
use tokio::sync::broadcast;

/// The canonical collections the engine maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    ChainProviders,
    Accounts,
    TokenContracts,
    TokenBalances,
    TokenTransferActions,
    Contacts,
    Sessions,
}

impl Collection {
    /// Key under which this collection is persisted.
    pub fn storage_key(&self) -> &'static str {
        match self {
            Collection::ChainProviders => "chain_providers",
            Collection::Accounts => "accounts",
            Collection::TokenContracts => "token_contracts",
            Collection::TokenBalances => "token_balances",
            Collection::TokenTransferActions => "token_transfer_actions",
            Collection::Contacts => "contacts",
            Collection::Sessions => "esr_sessions",
        }
    }
}

/// A read-only copy of one collection's contents after a change.
#[derive(Debug, Clone)]
pub enum CollectionSnapshot {
    ChainProviders(Vec<ChainProvider>),
    Accounts(Vec<Account>),
    TokenContracts(Vec<TokenContract>),
    TokenBalances(Vec<TokenBalance>),
    TokenTransferActions(Vec<TokenTransferAction>),
    Contacts(Vec<Contact>),
    Sessions(Vec<Session>),
}

impl CollectionSnapshot {
    pub fn collection(&self) -> Collection {
        match self {
            CollectionSnapshot::ChainProviders(_) => Collection::ChainProviders,
            CollectionSnapshot::Accounts(_) => Collection::Accounts,
            CollectionSnapshot::TokenContracts(_) => Collection::TokenContracts,
            CollectionSnapshot::TokenBalances(_) => Collection::TokenBalances,
            CollectionSnapshot::TokenTransferActions(_) => Collection::TokenTransferActions,
            CollectionSnapshot::Contacts(_) => Collection::Contacts,
            CollectionSnapshot::Sessions(_) => Collection::Sessions,
        }
    }
}

/// Events observable by the embedding application.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A collection is about to change.
    WillChange { collection: Collection },
    /// A collection changed; carries the new contents.
    DidChange { snapshot: CollectionSnapshot },
    /// The active account changed.
    ActiveAccountChanged { account: Option<Account> },
    /// The in-flight signing request changed.
    ActiveRequestChanged { request: Option<SigningRequest> },
    /// One account's sync pipeline ran to completion.
    SyncCompleted { chain_id: String, account: String },
}

/// Broadcast emitter for [`ChangeEvent`]s.
///
/// Cloning shares the underlying channel. Emitting never fails; events are
/// dropped when no observer is subscribed.
#[derive(Clone)]
pub struct ChangeEmitter {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeEmitter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ChangeEvent) {
        // A send error only means there is no subscriber right now.
        let _ = self.sender.send(event);
    }

    pub fn will_change(&self, collection: Collection) {
        self.emit(ChangeEvent::WillChange { collection });
    }

    pub fn did_change(&self, snapshot: CollectionSnapshot) {
        self.emit(ChangeEvent::DidChange { snapshot });
    }
}

impl Default for ChangeEmitter {
    fn default() -> Self {
        Self::new()
    }
}
