//! Durable identity-proof sessions.
//!
//! Accepting an identity request creates a session: a persisted record of the
//! grant, listable and revocable later. Revocation notifies the requester's
//! callback best-effort; local removal happens regardless of that POST's
//! outcome, since the grant is void the moment the user revokes it.

use crate::wallet::context::Stores;
use crate::wallet::events::Collection;
use crate::wallet::persistence::StatePersistenceService;
use crate::wallet::types::{Session, SigningRequestError, WalletError};

use rand::Rng;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Manages the persisted session collection.
pub struct SessionManager {
	stores: Arc<Stores>,
	persistence: Arc<StatePersistenceService>,
	http_client: Client,
}

impl SessionManager {
	pub fn new(stores: Arc<Stores>, persistence: Arc<StatePersistenceService>) -> Self {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.expect("Failed to create HTTP client");

		Self {
			stores,
			persistence,
			http_client,
		}
	}

	pub fn list(&self) -> Vec<Session> {
		self.stores.sessions.all()
	}

	/// Record a freshly granted session and persist the collection.
	pub async fn record(&self, session: Session) -> Result<(), WalletError> {
		info!(
			"Recording session {} for {} signed by {}",
			session.sid, session.requester, session.signer
		);
		self.stores.sessions.upsert(session);
		self.persist().await
	}

	/// Revoke a session: notify the stored callback best-effort, then remove
	/// the session locally no matter what the notification did.
	pub async fn revoke(&self, sid: &str) -> Result<Session, WalletError> {
		let session = self
			.stores
			.sessions
			.get(&sid.to_string())
			.ok_or_else(|| SigningRequestError::UnknownSession {
				sid: sid.to_string(),
			})?;

		let payload = json!({
			"sid": session.sid,
			"revoked": true,
			"token": session.revocation_token,
		});
		if let Err(e) = self
			.http_client
			.post(&session.callback_url)
			.json(&payload)
			.send()
			.await
		{
			warn!("Revocation notification for {} failed: {}", sid, e);
		}

		self.stores.sessions.remove(&sid.to_string());
		self.persist().await?;

		info!("Revoked session {}", sid);
		Ok(session)
	}

	async fn persist(&self) -> Result<(), WalletError> {
		self.persistence
			.save_collection(Collection::Sessions, &self.stores.sessions.all())
			.await
	}
}

/// Generate an opaque token the requester must present to prove a revocation
/// notification is genuine.
pub fn generate_revocation_token() -> String {
	let mut token = [0u8; 16];
	rand::rng().fill(&mut token);
	hex::encode(token)
}
