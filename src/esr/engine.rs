//! Signing-request engine.
//!
//! The engine drives a request through its lifecycle: parse, resolve, sign,
//! then broadcast or hand off to the requester's callback. It holds exactly
//! one in-flight request at a time and clears it on completion, on decline,
//! and on any failure along the way.
//!
//! Accepting is gated by the device authentication seam: a failed gate aborts
//! the whole flow without signing anything. Broadcasts go through the
//! scheduler's sequential lane so a sign-then-push chain can never overlap
//! another state-mutating operation. Callback dispatch substitutes the
//! caller's session id into the `{{sid}}` placeholder and then either POSTs
//! the payload directly (background) or returns the URL for the caller to
//! open (foreground). Identity accepts additionally record a durable session
//! before any callback runs, so a failing POST cannot lose the signed grant.

use crate::esr::request::SigningRequest;
use crate::esr::resolver::RequestResolver;
use crate::esr::sessions::{SessionManager, generate_revocation_token};
use crate::rpc::RpcError;
use crate::transaction::TransactionSigner;
use crate::wallet::context::{ChainHandles, Stores};
use crate::wallet::events::{ChangeEmitter, ChangeEvent};
use crate::wallet::persistence::StatePersistenceService;
use crate::wallet::sync::scheduler::OperationScheduler;
use crate::wallet::types::{
    Account, Session, SigningRequestError, ValidationError, WalletError,
};

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Local device authentication check run before anything is signed.
#[async_trait::async_trait]
pub trait AuthenticationGate: Send + Sync {
    async fn authenticate(&self) -> bool;
}

/// Gate for platforms without a local unlock mechanism.
pub struct AlwaysAllowGate;

#[async_trait::async_trait]
impl AuthenticationGate for AlwaysAllowGate {
    async fn authenticate(&self) -> bool {
        true
    }
}

/// How an accepted request was dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestDisposition {
    /// Foreground callback: the caller opens this URL.
    Opened { url: String },
    /// Background callback POSTed, or the request carried no callback.
    Completed,
}

/// Payload POSTed to (or encoded for) the requester's callback.
#[derive(Debug, Serialize)]
struct CallbackPayload {
    sig: String,
    sid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bn: Option<u64>,
}

#[derive(Clone)]
struct Inflight {
    request: SigningRequest,
    signer: Account,
}

/// State machine for inbound signing requests.
pub struct RequestEngine {
    handles: Arc<HashMap<String, ChainHandles>>,
    stores: Arc<Stores>,
    scheduler: OperationScheduler,
    signer: TransactionSigner,
    sessions: SessionManager,
    emitter: ChangeEmitter,
    gate: Arc<dyn AuthenticationGate>,
    http_client: Client,
    current: Mutex<Option<Inflight>>,
}

impl RequestEngine {
    pub fn new(
        handles: Arc<HashMap<String, ChainHandles>>,
        stores: Arc<Stores>,
        scheduler: OperationScheduler,
        signer: TransactionSigner,
        persistence: Arc<StatePersistenceService>,
        emitter: ChangeEmitter,
        gate: Arc<dyn AuthenticationGate>,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            sessions: SessionManager::new(stores.clone(), persistence),
            handles,
            stores,
            scheduler,
            signer,
            emitter,
            gate,
            http_client,
            current: Mutex::new(None),
        }
    }

    /// Parse an inbound request URI and make it the in-flight request.
    ///
    /// The preferred signer (normally the active account) is used when it
    /// lives on the request's chain; otherwise any local account on that chain
    /// serves. No local account on the chain fails the request.
    pub async fn handle_uri(
        &self,
        uri: &str,
        preferred_signer: Option<Account>,
    ) -> Result<SigningRequest, WalletError> {
        let request = SigningRequest::parse(uri)?;

        let signer = preferred_signer
            .filter(|a| a.chain_id == request.chain_id)
            .or_else(|| {
                self.stores
                    .accounts
                    .find(|a| a.chain_id == request.chain_id)
            })
            .ok_or_else(|| SigningRequestError::NoMatchingAccount {
                chain_id: request.chain_id.clone(),
            })?;

        let mut current = self.current.lock().await;
        if current.is_some() {
            return Err(SigningRequestError::RequestInFlight.into());
        }
        *current = Some(Inflight {
            request: request.clone(),
            signer,
        });

        self.emitter.emit(ChangeEvent::ActiveRequestChanged {
            request: Some(request.clone()),
        });
        info!(
            "Holding signing request {} from {} ({})",
            request.sid,
            request.account,
            if request.identity { "identity" } else { "actions" }
        );
        Ok(request)
    }

    /// The in-flight request, if any.
    pub async fn current(&self) -> Option<SigningRequest> {
        self.current.lock().await.as_ref().map(|i| i.request.clone())
    }

    /// Accept the in-flight request: resolve, sign, dispatch.
    ///
    /// The in-flight pair is cleared whether the flow completes or fails.
    pub async fn accept(&self) -> Result<RequestDisposition, WalletError> {
        let mut current = self.current.lock().await;
        let inflight = current
            .clone()
            .ok_or(SigningRequestError::NothingInFlight)?;

        if !self.gate.authenticate().await {
            *current = None;
            self.emitter
                .emit(ChangeEvent::ActiveRequestChanged { request: None });
            return Err(SigningRequestError::AuthenticationFailed.into());
        }

        let result = self.run_accept(&inflight).await;

        *current = None;
        self.emitter
            .emit(ChangeEvent::ActiveRequestChanged { request: None });
        result
    }

    /// Decline the in-flight request and clear it. No callback is dispatched.
    pub async fn decline(&self) -> Result<(), WalletError> {
        let mut current = self.current.lock().await;
        let inflight = current
            .take()
            .ok_or(SigningRequestError::NothingInFlight)?;

        self.emitter
            .emit(ChangeEvent::ActiveRequestChanged { request: None });
        info!("Declined signing request {}", inflight.request.sid);
        Ok(())
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    async fn run_accept(&self, inflight: &Inflight) -> Result<RequestDisposition, WalletError> {
        let request = &inflight.request;
        let handles = self.handles.get(&request.chain_id).ok_or_else(|| {
            ValidationError::MissingChainProvider {
                chain_id: request.chain_id.clone(),
            }
        })?;

        let resolver = RequestResolver::new(
            handles.chain.clone(),
            handles.provider.clone(),
            self.scheduler.clone(),
            self.stores.clone(),
        );
        let resolved = resolver.resolve(request, &inflight.signer).await?;

        let public_key = inflight
            .signer
            .key_for_permission("active")
            .ok_or_else(|| ValidationError::MissingActiveKey {
                name: inflight.signer.name.clone(),
            })?
            .to_string();

        let signed = self
            .signer
            .sign(resolved.transaction, &request.chain_id, &public_key)
            .await?;
        let signature = signed.signatures.first().cloned().unwrap_or_default();

        // Broadcast when the request asks for it. Identity proofs never
        // broadcast; their transaction only exists to be signed.
        let receipt = if request.broadcast && !request.identity {
            let receipt = self
                .scheduler
                .sequential(handles.chain.push_transaction(&signed))
                .await
                .map_err(RpcError::into_chain_error)?;
            info!(
                "Broadcast request {} as transaction {}",
                request.sid, receipt.transaction_id
            );
            Some(receipt)
        } else {
            None
        };

        let callback_url = resolved
            .callback
            .as_ref()
            .map(|cb| substitute_sid(&cb.url, &request.sid));

        // The cryptographic commitment stands once signed: record the session
        // before the callback gets a chance to fail.
        if request.identity {
            self.sessions
                .record(Session {
                    sid: request.sid.clone(),
                    chain_id: request.chain_id.clone(),
                    requester: request.account.clone(),
                    signer: inflight.signer.name.clone(),
                    callback_url: callback_url.clone().unwrap_or_default(),
                    revocation_token: generate_revocation_token(),
                    created: Utc::now(),
                })
                .await?;
        }

        match (&resolved.callback, callback_url) {
            (Some(callback), Some(url)) => {
                let payload = CallbackPayload {
                    sig: signature,
                    sid: request.sid.clone(),
                    tx: receipt.as_ref().map(|r| r.transaction_id.clone()),
                    bn: receipt.as_ref().and_then(|r| r.block_num()),
                };

                if callback.background {
                    if let Err(e) = self.http_client.post(&url).json(&payload).send().await {
                        warn!("Background callback for {} failed: {}", request.sid, e);
                    }
                    Ok(RequestDisposition::Completed)
                } else {
                    Ok(RequestDisposition::Opened { url })
                }
            }
            _ => Ok(RequestDisposition::Completed),
        }
    }
}

/// Substitute the session id into a callback URL template, verbatim.
pub fn substitute_sid(template: &str, sid: &str) -> String {
    template.replace("{{sid}}", sid)
}
