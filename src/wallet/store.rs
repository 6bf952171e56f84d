//! Canonical collection stores and the merge engine.
//!
//! Each canonical collection lives in a [`Store`] behind a single write lock, so
//! there is exactly one active mutator at a time even though fetches run in
//! parallel. Merging is upsert-only: a fresh fetch replaces items it names and
//! carries forward locally-held fields the fetch did not supply; items absent
//! from a fetch are never deleted, since absence from one fetch is not proof of
//! removal. Deletion is a separate explicit operation.

use crate::wallet::events::{ChangeEmitter, Collection, CollectionSnapshot};
use crate::wallet::types::{
    Account, ChainProvider, Contact, Session, TokenBalance, TokenContract, TokenTransferAction,
};
use std::hash::Hash;
use std::sync::RwLock;

/// An item that can live in a canonical collection.
pub trait Mergeable: Clone {
    type Key: Eq + Hash + Clone;

    /// Identity of this item within its collection.
    fn merge_key(&self) -> Self::Key;

    /// Copy forward locally-held fields the incoming item does not supply.
    fn carry_forward(&mut self, _previous: &Self) {}
}

/// Binds an item type to its collection and snapshot variant.
pub trait CollectionItem: Mergeable {
    const COLLECTION: Collection;

    fn snapshot(items: Vec<Self>) -> CollectionSnapshot;
}

/// A canonical collection with explicit, event-emitting mutations.
pub struct Store<T: CollectionItem> {
    items: RwLock<Vec<T>>,
    emitter: ChangeEmitter,
}

impl<T: CollectionItem> Store<T> {
    pub fn new(emitter: ChangeEmitter) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            emitter,
        }
    }

    pub fn all(&self) -> Vec<T> {
        self.items.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().unwrap().is_empty()
    }

    pub fn get(&self, key: &T::Key) -> Option<T> {
        self.items
            .read()
            .unwrap()
            .iter()
            .find(|item| item.merge_key() == *key)
            .cloned()
    }

    pub fn find<F: Fn(&T) -> bool>(&self, predicate: F) -> Option<T> {
        self.items
            .read()
            .unwrap()
            .iter()
            .find(|item| predicate(item))
            .cloned()
    }

    pub fn filter<F: Fn(&T) -> bool>(&self, predicate: F) -> Vec<T> {
        self.items
            .read()
            .unwrap()
            .iter()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }

    /// Insert or replace a single item. A plain replace: no field carry-over.
    pub fn upsert(&self, item: T) {
        self.emitter.will_change(T::COLLECTION);
        let snapshot = {
            let mut items = self.items.write().unwrap();
            let key = item.merge_key();
            match items.iter_mut().find(|i| i.merge_key() == key) {
                Some(existing) => *existing = item,
                None => items.push(item),
            }
            items.clone()
        };
        self.emitter.did_change(T::snapshot(snapshot));
    }

    /// Merge a freshly fetched batch into the canonical collection.
    ///
    /// Incoming items replace existing items with the same identity, carrying
    /// forward preserved fields; new items append. Existing items the batch
    /// does not name stay untouched.
    pub fn merge(&self, incoming: Vec<T>) {
        if incoming.is_empty() {
            return;
        }
        self.emitter.will_change(T::COLLECTION);
        let snapshot = {
            let mut items = self.items.write().unwrap();
            for mut item in incoming {
                let key = item.merge_key();
                match items.iter_mut().find(|i| i.merge_key() == key) {
                    Some(existing) => {
                        item.carry_forward(existing);
                        *existing = item;
                    }
                    None => items.push(item),
                }
            }
            items.clone()
        };
        self.emitter.did_change(T::snapshot(snapshot));
    }

    /// Replace the whole collection, e.g. when restoring persisted state.
    pub fn replace_all(&self, new_items: Vec<T>) {
        self.emitter.will_change(T::COLLECTION);
        let snapshot = {
            let mut items = self.items.write().unwrap();
            *items = new_items;
            items.clone()
        };
        self.emitter.did_change(T::snapshot(snapshot));
    }

    /// Explicitly delete an item. Returns the removed item, if any.
    pub fn remove(&self, key: &T::Key) -> Option<T> {
        self.emitter.will_change(T::COLLECTION);
        let (removed, snapshot) = {
            let mut items = self.items.write().unwrap();
            let position = items.iter().position(|i| i.merge_key() == *key);
            let removed = position.map(|p| items.remove(p));
            (removed, items.clone())
        };
        self.emitter.did_change(T::snapshot(snapshot));
        removed
    }
}

impl Mergeable for ChainProvider {
    type Key = String;

    fn merge_key(&self) -> String {
        self.chain_id.clone()
    }
}

impl CollectionItem for ChainProvider {
    const COLLECTION: Collection = Collection::ChainProviders;

    fn snapshot(items: Vec<Self>) -> CollectionSnapshot {
        CollectionSnapshot::ChainProviders(items)
    }
}

impl Mergeable for Account {
    type Key = (String, String);

    fn merge_key(&self) -> Self::Key {
        (self.chain_id.clone(), self.name.clone())
    }

    fn carry_forward(&mut self, previous: &Self) {
        // A permissions fetch does not supply profile fields and vice versa.
        if self.permissions.is_empty() {
            self.permissions = previous.permissions.clone();
        }
        if self.avatar.is_none() {
            self.avatar = previous.avatar.clone();
        }
        if self.nickname.is_none() {
            self.nickname = previous.nickname.clone();
        }
        if self.verified.is_none() {
            self.verified = previous.verified;
        }
    }
}

impl CollectionItem for Account {
    const COLLECTION: Collection = Collection::Accounts;

    fn snapshot(items: Vec<Self>) -> CollectionSnapshot {
        CollectionSnapshot::Accounts(items)
    }
}

impl Mergeable for TokenContract {
    type Key = (String, String, String);

    fn merge_key(&self) -> Self::Key {
        (
            self.chain_id.clone(),
            self.contract.clone(),
            self.symbol.clone(),
        )
    }

    fn carry_forward(&mut self, previous: &Self) {
        // The exchange rate is cached locally; a fetch that does not supply one
        // must not wipe it.
        if self.rate.is_none() || self.rate == Some(0.0) {
            self.rate = previous.rate;
        }
    }
}

impl CollectionItem for TokenContract {
    const COLLECTION: Collection = Collection::TokenContracts;

    fn snapshot(items: Vec<Self>) -> CollectionSnapshot {
        CollectionSnapshot::TokenContracts(items)
    }
}

impl Mergeable for TokenBalance {
    type Key = (String, String, String, String);

    fn merge_key(&self) -> Self::Key {
        (
            self.chain_id.clone(),
            self.account.clone(),
            self.contract.clone(),
            self.amount.symbol().to_string(),
        )
    }
}

impl CollectionItem for TokenBalance {
    const COLLECTION: Collection = Collection::TokenBalances;

    fn snapshot(items: Vec<Self>) -> CollectionSnapshot {
        CollectionSnapshot::TokenBalances(items)
    }
}

impl Mergeable for TokenTransferAction {
    type Key = (String, u32);

    fn merge_key(&self) -> Self::Key {
        (self.tx_id.clone(), self.action_ordinal)
    }
}

impl CollectionItem for TokenTransferAction {
    const COLLECTION: Collection = Collection::TokenTransferActions;

    fn snapshot(items: Vec<Self>) -> CollectionSnapshot {
        CollectionSnapshot::TokenTransferActions(items)
    }
}

impl Mergeable for Contact {
    type Key = String;

    fn merge_key(&self) -> String {
        self.name.clone()
    }

    fn carry_forward(&mut self, previous: &Self) {
        if self.avatar.is_none() {
            self.avatar = previous.avatar.clone();
        }
        if self.nickname.is_none() {
            self.nickname = previous.nickname.clone();
        }
        if self.verified.is_none() {
            self.verified = previous.verified;
        }
    }
}

impl CollectionItem for Contact {
    const COLLECTION: Collection = Collection::Contacts;

    fn snapshot(items: Vec<Self>) -> CollectionSnapshot {
        CollectionSnapshot::Contacts(items)
    }
}

impl Mergeable for Session {
    type Key = String;

    fn merge_key(&self) -> String {
        self.sid.clone()
    }
}

impl CollectionItem for Session {
    const COLLECTION: Collection = Collection::Sessions;

    fn snapshot(items: Vec<Self>) -> CollectionSnapshot {
        CollectionSnapshot::Sessions(items)
    }
}
