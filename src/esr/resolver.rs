//! Signing-request resolution.
//!
//! Resolution turns a parsed request into a concrete transaction bound to the
//! signer's active permission. The identity branch needs no ABI work: it
//! fetches the requester's profile and produces a zero-action proof. The
//! action branch fans out one ABI fetch per distinct target contract, decodes
//! every action against the fetched ABI, and builds a display line per action:
//! token transfers get a human-readable line with a currency-converted amount
//! from the matching token contract's cached rate, anything else a generic
//! line with the raw action name. Actions whose ABI never arrived are dropped;
//! if nothing displayable remains, the whole resolution fails, since showing
//! the user an unintelligible proposal is unsafe.
//!
//! The transaction header is always built from freshly fetched chain head
//! info, never from a cached value.

use crate::esr::request::{
    PLACEHOLDER_ACTOR, PLACEHOLDER_PERMISSION, RequestAction, RequestCallback, SigningRequest,
};
use crate::rpc::{AbiDef, ChainRpc};
use crate::transaction::{Transaction, TransactionBuilder, TxAction};
use crate::utils::format_fiat;
use crate::wallet::context::Stores;
use crate::wallet::sync::orchestrator::fetch_user_info;
use crate::wallet::sync::scheduler::OperationScheduler;
use crate::wallet::types::{
    Account, Asset, ChainProvider, Contact, PermissionLevel, SigningRequestError, WalletError,
};

use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Human-readable rendering of one resolved action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionDisplay {
    /// A decoded token transfer.
    Transfer {
        contract: String,
        from: String,
        to: String,
        quantity: Asset,
        memo: String,
        fiat_value: Option<f64>,
    },
    /// Anything else the ABI declares.
    Raw { contract: String, name: String },
}

impl std::fmt::Display for ActionDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionDisplay::Transfer {
                to,
                quantity,
                fiat_value,
                ..
            } => match fiat_value {
                Some(value) => write!(f, "{} to {} ({})", quantity, to, format_fiat(*value)),
                None => write!(f, "{} to {}", quantity, to),
            },
            ActionDisplay::Raw { contract, name } => write!(f, "{}::{}", contract, name),
        }
    }
}

/// A concrete, signable resolution of one request.
///
/// Produced once per accept cycle and discarded after use.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub transaction: Transaction,
    pub display: Vec<ActionDisplay>,
    pub callback: Option<RequestCallback>,
    /// Requester profile, fetched best-effort for identity requests.
    pub requester_profile: Option<Contact>,
}

/// Shape a token transfer action's data decodes into.
#[derive(Debug, Deserialize)]
struct TransferData {
    from: String,
    to: String,
    quantity: String,
    #[serde(default)]
    memo: String,
}

/// Resolves parsed requests against one chain provider.
pub struct RequestResolver {
    chain: Arc<dyn ChainRpc>,
    provider: ChainProvider,
    scheduler: OperationScheduler,
    stores: Arc<Stores>,
}

impl RequestResolver {
    pub fn new(
        chain: Arc<dyn ChainRpc>,
        provider: ChainProvider,
        scheduler: OperationScheduler,
        stores: Arc<Stores>,
    ) -> Self {
        Self {
            chain,
            provider,
            scheduler,
            stores,
        }
    }

    pub async fn resolve(
        &self,
        request: &SigningRequest,
        signer: &Account,
    ) -> Result<ResolvedRequest, WalletError> {
        if request.identity {
            self.resolve_identity(request).await
        } else {
            self.resolve_actions(request, signer).await
        }
    }

    /// Zero-action resolution representing a proof of identity.
    async fn resolve_identity(
        &self,
        request: &SigningRequest,
    ) -> Result<ResolvedRequest, WalletError> {
        let requester_profile = match self
            .scheduler
            .concurrent(fetch_user_info(
                &*self.chain,
                &self.provider,
                &request.account,
            ))
            .await
        {
            Ok(Some(row)) => {
                let mut contact = Contact::bare(request.account.clone());
                contact.nickname = row.name;
                contact.avatar = row.avatar;
                contact.verified = row.verified;
                Some(contact)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Requester profile unavailable: {}", e);
                None
            }
        };

        let transaction = self.header_from_fresh_head().await?.build().map_err(|e| {
            WalletError::chain(format!("identity transaction build failed: {}", e))
        })?;

        Ok(ResolvedRequest {
            transaction,
            display: Vec::new(),
            callback: request.callback.clone(),
            requester_profile,
        })
    }

    async fn resolve_actions(
        &self,
        request: &SigningRequest,
        signer: &Account,
    ) -> Result<ResolvedRequest, WalletError> {
        // Fan out one ABI fetch per distinct target contract. Per-item failures
        // are swallowed here; an action without an ABI is dropped below.
        let contracts = request.target_contracts();
        let fetches = contracts.into_iter().map(|contract| {
            let scheduler = self.scheduler.clone();
            let chain = self.chain.clone();
            async move {
                let result = scheduler.concurrent(chain.get_abi(&contract)).await;
                (contract, result)
            }
        });

        let mut abis: HashMap<String, AbiDef> = HashMap::new();
        for (contract, result) in join_all(fetches).await {
            match result {
                Ok(abi) => {
                    abis.insert(contract, abi);
                }
                Err(e) => warn!("ABI for {} unavailable: {}", contract, e),
            }
        }

        let mut display = Vec::new();
        let mut actions = Vec::new();
        for action in &request.actions {
            let Some(abi) = abis.get(&action.account) else {
                debug!("Dropping action on {}: contract not resolvable", action.account);
                continue;
            };
            let Some(line) = self.decode_action(abi, action) else {
                debug!(
                    "Dropping action {}::{}: not declared by the ABI",
                    action.account, action.name
                );
                continue;
            };

            display.push(line);
            actions.push(TxAction {
                account: action.account.clone(),
                name: action.name.clone(),
                authorization: substitute_authorization(&action.authorization, signer),
                data: action.data.clone(),
            });
        }

        if actions.is_empty() {
            return Err(SigningRequestError::NoResolvableActions.into());
        }

        let transaction = self
            .header_from_fresh_head()
            .await?
            .with_actions(actions)
            .build()
            .map_err(|e| WalletError::chain(format!("transaction build failed: {}", e)))?;

        Ok(ResolvedRequest {
            transaction,
            display,
            callback: request.callback.clone(),
            requester_profile: None,
        })
    }

    /// Builder seeded with freshly fetched head info, independent of any cache.
    async fn header_from_fresh_head(&self) -> Result<TransactionBuilder, WalletError> {
        let info = self
            .scheduler
            .concurrent(self.chain.get_info())
            .await
            .map_err(crate::rpc::RpcError::into_chain_error)?;
        Ok(TransactionBuilder::new().with_chain_info(info))
    }

    /// Decode one action against its ABI, or drop it by returning `None`.
    fn decode_action(&self, abi: &AbiDef, action: &RequestAction) -> Option<ActionDisplay> {
        let struct_def = abi.action_struct(&action.name)?;

        if action.name == "transfer" && struct_def.fields.iter().any(|f| f.name == "quantity") {
            if let Ok(transfer) =
                serde_json::from_value::<TransferData>(action.data.clone())
            {
                if let Ok(quantity) = Asset::parse(&transfer.quantity) {
                    let fiat_value = self
                        .stores
                        .token_contracts
                        .get(&(
                            self.provider.chain_id.clone(),
                            action.account.clone(),
                            quantity.symbol().to_string(),
                        ))
                        .and_then(|contract| contract.rate)
                        .map(|rate| rate * quantity.value());

                    return Some(ActionDisplay::Transfer {
                        contract: action.account.clone(),
                        from: transfer.from,
                        to: transfer.to,
                        quantity,
                        memo: transfer.memo,
                        fiat_value,
                    });
                }
            }
        }

        Some(ActionDisplay::Raw {
            contract: action.account.clone(),
            name: action.name.clone(),
        })
    }
}

/// Bind an action's authorization to the signer's active permission, replacing
/// requester placeholders.
fn substitute_authorization(
    authorization: &[PermissionLevel],
    signer: &Account,
) -> Vec<PermissionLevel> {
    if authorization.is_empty() {
        return vec![PermissionLevel {
            actor: signer.name.clone(),
            permission: "active".to_string(),
        }];
    }

    authorization
        .iter()
        .map(|level| PermissionLevel {
            actor: if level.actor == PLACEHOLDER_ACTOR {
                signer.name.clone()
            } else {
                level.actor.clone()
            },
            permission: if level.permission == PLACEHOLDER_PERMISSION {
                "active".to_string()
            } else {
                level.permission.clone()
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::MockChainRpc;
    use crate::wallet::events::ChangeEmitter;
    use crate::wallet::types::TokenContract;

    fn provider() -> ChainProvider {
        ChainProvider {
            chain_id: "chain".into(),
            name: "Test Net".into(),
            rpc_url: "http://rpc.invalid".into(),
            history_url: "http://history.invalid".into(),
            profile_contract: "profiles".into(),
            system_symbol: "SYS".into(),
        }
    }

    fn token_abi() -> AbiDef {
        serde_json::from_value(serde_json::json!({
            "version": "ledger::abi/1.1",
            "structs": [{
                "name": "transfer",
                "base": "",
                "fields": [
                    {"name": "from", "type": "name"},
                    {"name": "to", "type": "name"},
                    {"name": "quantity", "type": "asset"},
                    {"name": "memo", "type": "string"}
                ]
            }],
            "actions": [{"name": "transfer", "type": "transfer"}]
        }))
        .unwrap()
    }

    fn transfer_request(contract: &str) -> SigningRequest {
        SigningRequest {
            chain_id: "chain".into(),
            account: "dapp".into(),
            sid: "sid-1".into(),
            identity: false,
            broadcast: true,
            actions: vec![RequestAction {
                account: contract.into(),
                name: "transfer".into(),
                authorization: vec![PermissionLevel {
                    actor: PLACEHOLDER_ACTOR.into(),
                    permission: PLACEHOLDER_PERMISSION.into(),
                }],
                data: serde_json::json!({
                    "from": "alice",
                    "to": "dapp",
                    "quantity": "1.2345 TOK",
                    "memo": "order 42",
                }),
            }],
            callback: None,
        }
    }

    fn resolver_with(chain: MockChainRpc) -> (RequestResolver, Arc<Stores>) {
        let stores = Arc::new(Stores::new(ChangeEmitter::new()));
        let resolver = RequestResolver::new(
            Arc::new(chain),
            provider(),
            OperationScheduler::new(4),
            stores.clone(),
        );
        (resolver, stores)
    }

    #[tokio::test]
    async fn transfer_action_resolves_with_matching_details() {
        let chain = MockChainRpc::new("chain").with_abi("token.a", token_abi());
        let (resolver, stores) = resolver_with(chain);
        stores.token_contracts.merge(vec![TokenContract {
            chain_id: "chain".into(),
            contract: "token.a".into(),
            symbol: "TOK".into(),
            precision: 4,
            rate: Some(2.0),
            blacklisted: false,
            supply: None,
        }]);

        let request = transfer_request("token.a");
        let signer = Account::new("chain", "alice");
        let resolved = resolver.resolve(&request, &signer).await.unwrap();

        // The resolved transaction carries the original action, bound to the
        // signer's active permission.
        assert_eq!(resolved.transaction.actions.len(), 1);
        let action = &resolved.transaction.actions[0];
        assert_eq!(action.data, request.actions[0].data);
        assert_eq!(
            action.authorization,
            vec![PermissionLevel {
                actor: "alice".into(),
                permission: "active".into(),
            }]
        );

        match &resolved.display[0] {
            ActionDisplay::Transfer {
                to,
                quantity,
                memo,
                fiat_value,
                ..
            } => {
                assert_eq!(to, "dapp");
                assert_eq!(quantity.to_string(), "1.2345 TOK");
                assert_eq!(memo, "order 42");
                assert!((fiat_value.unwrap() - 2.469).abs() < 1e-9);
            }
            other => panic!("expected transfer display, got {:?}", other),
        }
        assert_eq!(resolved.display[0].to_string(), "1.2345 TOK to dapp ($2.47)");
    }

    #[tokio::test]
    async fn unknown_action_falls_back_to_raw_display() {
        let abi: AbiDef = serde_json::from_value(serde_json::json!({
            "structs": [{"name": "play", "base": "", "fields": []}],
            "actions": [{"name": "play", "type": "play"}]
        }))
        .unwrap();
        let chain = MockChainRpc::new("chain").with_abi("game", abi);
        let (resolver, _stores) = resolver_with(chain);

        let mut request = transfer_request("game");
        request.actions[0].name = "play".into();
        let resolved = resolver
            .resolve(&request, &Account::new("chain", "alice"))
            .await
            .unwrap();

        assert_eq!(resolved.display[0].to_string(), "game::play");
    }

    #[tokio::test]
    async fn actions_without_a_resolvable_abi_fail_the_request() {
        let chain = MockChainRpc::new("chain").failing_abi("token.a");
        let (resolver, _stores) = resolver_with(chain);

        let result = resolver
            .resolve(&transfer_request("token.a"), &Account::new("chain", "alice"))
            .await;
        assert!(matches!(
            result,
            Err(WalletError::SigningRequest(
                SigningRequestError::NoResolvableActions
            ))
        ));
    }

    #[tokio::test]
    async fn one_dead_abi_only_drops_its_own_actions() {
        let chain = MockChainRpc::new("chain")
            .with_abi("token.a", token_abi())
            .failing_abi("game");
        let (resolver, _stores) = resolver_with(chain);

        let mut request = transfer_request("token.a");
        request.actions.push(RequestAction {
            account: "game".into(),
            name: "play".into(),
            authorization: vec![],
            data: serde_json::json!({}),
        });

        let resolved = resolver
            .resolve(&request, &Account::new("chain", "alice"))
            .await
            .unwrap();
        assert_eq!(resolved.transaction.actions.len(), 1);
        assert_eq!(resolved.transaction.actions[0].account, "token.a");
    }

    #[tokio::test]
    async fn identity_requests_resolve_to_zero_actions() {
        let chain = MockChainRpc::new("chain").with_profile(
            "profiles",
            crate::rpc::UserInfoRow {
                acc: "dapp".into(),
                name: Some("The Dapp".into()),
                avatar: None,
                verified: None,
            },
        );
        let (resolver, _stores) = resolver_with(chain);

        let request = SigningRequest {
            identity: true,
            actions: vec![],
            ..transfer_request("token.a")
        };
        let resolved = resolver
            .resolve(&request, &Account::new("chain", "alice"))
            .await
            .unwrap();

        assert!(resolved.transaction.actions.is_empty());
        assert!(resolved.display.is_empty());
        assert_eq!(
            resolved.requester_profile.unwrap().nickname.as_deref(),
            Some("The Dapp")
        );
    }
}
