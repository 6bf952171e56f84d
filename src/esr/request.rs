//! Signing-request URI parsing.
//!
//! A signing request travels as a compact URI: the request scheme followed by a
//! base64url-encoded JSON payload carrying the chain id, the requester account,
//! a caller-supplied session id, either an identity marker or a list of
//! proposed actions, a callback descriptor, and a broadcast flag. A parsed
//! request is read-only; it is never mutated, only resolved into a concrete
//! transaction by the resolver.

use crate::wallet::types::{PermissionLevel, SigningRequestError};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// URI scheme a signing request arrives under.
pub const REQUEST_SCHEME: &str = "esr";

/// Placeholder actor a requester uses to mean "whoever signs this".
pub const PLACEHOLDER_ACTOR: &str = "............1";

/// Placeholder permission resolved to the signer's active permission.
pub const PLACEHOLDER_PERMISSION: &str = "............2";

/// Callback descriptor of a request.
///
/// Background callbacks are POSTed directly by the signer; foreground
/// callbacks are returned as a URL for the requester's application to open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestCallback {
	pub url: String,
	#[serde(default)]
	pub background: bool,
}

/// One proposed action of a request, with its data still in decoded form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestAction {
	pub account: String,
	pub name: String,
	#[serde(default)]
	pub authorization: Vec<PermissionLevel>,
	#[serde(default)]
	pub data: serde_json::Value,
}

/// A decoded signing request. Read-only once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningRequest {
	pub chain_id: String,
	/// Requesting account name.
	pub account: String,
	/// Caller-supplied session id.
	pub sid: String,
	#[serde(default)]
	pub identity: bool,
	#[serde(default)]
	pub broadcast: bool,
	#[serde(default)]
	pub actions: Vec<RequestAction>,
	#[serde(default)]
	pub callback: Option<RequestCallback>,
}

impl SigningRequest {
	/// Decode a request URI.
	pub fn parse(uri: &str) -> Result<Self, SigningRequestError> {
		let malformed = |reason: &str| SigningRequestError::Malformed {
			reason: reason.to_string(),
		};

		let (scheme, payload) = uri.split_once("://").ok_or_else(|| malformed("no scheme"))?;
		if scheme != REQUEST_SCHEME {
			return Err(SigningRequestError::UnsupportedScheme {
				scheme: scheme.to_string(),
			});
		}

		let bytes = URL_SAFE_NO_PAD
			.decode(payload.trim_end_matches('='))
			.map_err(|e| malformed(&format!("payload encoding: {}", e)))?;

		let request: SigningRequest = serde_json::from_slice(&bytes)
			.map_err(|e| malformed(&format!("payload body: {}", e)))?;

		if request.chain_id.is_empty() {
			return Err(malformed("empty chain id"));
		}
		if request.sid.is_empty() {
			return Err(malformed("empty session id"));
		}
		if !request.identity && request.actions.is_empty() {
			return Err(malformed("neither identity marker nor actions"));
		}

		Ok(request)
	}

	/// Encode this request back into its URI form.
	pub fn encode(&self) -> String {
		let payload = serde_json::to_vec(self).unwrap_or_default();
		format!("{}://{}", REQUEST_SCHEME, URL_SAFE_NO_PAD.encode(payload))
	}

	/// Distinct target contract accounts of the proposed actions, in order of
	/// first appearance.
	pub fn target_contracts(&self) -> Vec<String> {
		let mut contracts: Vec<String> = Vec::new();
		for action in &self.actions {
			if !contracts.contains(&action.account) {
				contracts.push(action.account.clone());
			}
		}
		contracts
	}
}
