//! Core domain types for the wallet engine.
//!
//! Everything the sync pipeline and the signing-request engine operate on lives here:
//! chain providers, accounts, token contracts and balances, transfer history, contacts,
//! signing-request sessions, and the error taxonomy surfaced by every top-level API.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration describing one blockchain network endpoint.
///
/// Identity is the chain id; a provider is immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainProvider {
	pub chain_id: String,
	pub name: String,
	pub rpc_url: String,
	pub history_url: String,
	/// Contract account holding on-chain user profile rows.
	pub profile_contract: String,
	pub system_symbol: String,
}

/// A single key and its weight within an authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyWeight {
	pub key: String,
	pub weight: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authority {
	pub threshold: u32,
	pub keys: Vec<KeyWeight>,
}

/// A named permission on an account, as returned by the chain.
///
/// Permissions are only ever refreshed from `get_account`, never invented locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
	pub perm_name: String,
	pub parent: String,
	pub required_auth: Authority,
}

/// An actor/permission pair authorizing an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionLevel {
	pub actor: String,
	pub permission: String,
}

/// A named identity on one chain. Identity is `(chain_id, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
	pub chain_id: String,
	pub name: String,
	#[serde(default)]
	pub permissions: Vec<Permission>,
	#[serde(default)]
	pub avatar: Option<String>,
	#[serde(default)]
	pub nickname: Option<String>,
	#[serde(default)]
	pub verified: Option<bool>,
}

impl Account {
	pub fn new(chain_id: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			chain_id: chain_id.into(),
			name: name.into(),
			permissions: Vec::new(),
			avatar: None,
			nickname: None,
			verified: None,
		}
	}

	/// First key of the named permission, if the account carries one.
	pub fn key_for_permission(&self, permission: &str) -> Option<&str> {
		self.permissions
			.iter()
			.find(|p| p.perm_name == permission)
			.and_then(|p| p.required_auth.keys.first())
			.map(|k| k.key.as_str())
	}
}

/// A fungible-token definition. Identity is `(chain_id, contract, symbol)`.
///
/// The exchange rate is cached locally and must survive merges that do not
/// supply it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenContract {
	pub chain_id: String,
	pub contract: String,
	pub symbol: String,
	pub precision: u8,
	#[serde(default)]
	pub rate: Option<f64>,
	#[serde(default)]
	pub blacklisted: bool,
	#[serde(default)]
	pub supply: Option<Asset>,
}

impl TokenContract {
	/// Placeholder for a balance whose contract is not locally known, so the
	/// caller never dereferences a missing contract.
	pub fn placeholder(chain_id: &str, contract: &str, symbol: &str, precision: u8) -> Self {
		Self {
			chain_id: chain_id.to_string(),
			contract: contract.to_string(),
			symbol: symbol.to_string(),
			precision,
			rate: None,
			blacklisted: true,
			supply: Some(Asset::zero(symbol, precision)),
		}
	}
}

/// An account's holding of one token. Identity is `(chain_id, account, contract, symbol)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
	pub chain_id: String,
	pub account: String,
	pub contract: String,
	pub amount: Asset,
}

/// A historical transfer event. Identity derives from `(tx_id, action_ordinal)`;
/// immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransferAction {
	pub chain_id: String,
	pub account: String,
	pub contract: String,
	pub from: String,
	pub to: String,
	pub quantity: Asset,
	pub memo: String,
	pub tx_id: String,
	pub action_ordinal: u32,
	pub date: NaiveDateTime,
	/// True when the owning account is the sender.
	pub sent: bool,
}

impl TokenTransferAction {
	/// The counterparty of this transfer from the owning account's point of view.
	pub fn other(&self) -> &str {
		if self.sent { &self.to } else { &self.from }
	}
}

/// A counterparty previously transferred with. Identity is the account name;
/// contacts are derived from transfer history, never fetched independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
	pub name: String,
	#[serde(default)]
	pub avatar: Option<String>,
	#[serde(default)]
	pub nickname: Option<String>,
	#[serde(default)]
	pub verified: Option<bool>,
}

impl Contact {
	pub fn bare(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			avatar: None,
			nickname: None,
			verified: None,
		}
	}
}

/// A durable grant created by accepting an identity request.
///
/// Created on accept, persisted, and removed only by an explicit revoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
	pub sid: String,
	pub chain_id: String,
	pub requester: String,
	pub signer: String,
	pub callback_url: String,
	pub revocation_token: String,
	pub created: DateTime<Utc>,
}

/// A fixed-point token quantity, rendered as `"1.2345 SYM"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Asset {
	units: i64,
	symbol: String,
	precision: u8,
}

impl Asset {
	pub fn new(units: i64, symbol: impl Into<String>, precision: u8) -> Self {
		Self {
			units,
			symbol: symbol.into(),
			precision,
		}
	}

	pub fn zero(symbol: &str, precision: u8) -> Self {
		Self::new(0, symbol, precision)
	}

	/// Parse `"1.2345 SYM"`; the number of fraction digits fixes the precision.
	pub fn parse(input: &str) -> Result<Self, ValidationError> {
		let malformed = || ValidationError::MalformedQuantity {
			input: input.to_string(),
		};

		let mut parts = input.split_whitespace();
		let amount = parts.next().ok_or_else(malformed)?;
		let symbol = parts.next().ok_or_else(malformed)?;
		if parts.next().is_some() || symbol.is_empty() {
			return Err(malformed());
		}
		if !symbol.chars().all(|c| c.is_ascii_uppercase()) || symbol.len() > 7 {
			return Err(malformed());
		}

		let (negative, digits) = match amount.strip_prefix('-') {
			Some(rest) => (true, rest),
			None => (false, amount),
		};

		let (int_part, frac_part) = match digits.split_once('.') {
			Some((i, f)) => (i, f),
			None => (digits, ""),
		};
		if int_part.is_empty() || frac_part.len() > 18 {
			return Err(malformed());
		}
		if !int_part.chars().all(|c| c.is_ascii_digit())
			|| !frac_part.chars().all(|c| c.is_ascii_digit())
		{
			return Err(malformed());
		}

		let precision = frac_part.len() as u8;
		let scale = 10i64.pow(precision as u32);
		let units = int_part
			.parse::<i64>()
			.ok()
			.and_then(|i| i.checked_mul(scale))
			.and_then(|i| i.checked_add(frac_part.parse::<i64>().unwrap_or(0)))
			.ok_or_else(malformed)?;

		Ok(Self {
			units: if negative { -units } else { units },
			symbol: symbol.to_string(),
			precision,
		})
	}

	pub fn units(&self) -> i64 {
		self.units
	}

	pub fn symbol(&self) -> &str {
		&self.symbol
	}

	pub fn precision(&self) -> u8 {
		self.precision
	}

	pub fn is_negative(&self) -> bool {
		self.units < 0
	}

	/// The quantity as a floating value, for display-only conversions.
	pub fn value(&self) -> f64 {
		self.units as f64 / 10f64.powi(self.precision as i32)
	}

	/// Whether two assets denote the same token (symbol and precision).
	pub fn same_token(&self, other: &Asset) -> bool {
		self.symbol == other.symbol && self.precision == other.precision
	}
}

impl std::fmt::Display for Asset {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let scale = 10u64.pow(self.precision as u32);
		let sign = if self.units < 0 { "-" } else { "" };
		let magnitude = self.units.unsigned_abs();
		let int_part = magnitude / scale;
		let frac_part = magnitude % scale;
		if self.precision == 0 {
			write!(f, "{}{} {}", sign, int_part, self.symbol)
		} else {
			write!(
				f,
				"{}{}.{:0width$} {}",
				sign,
				int_part,
				frac_part,
				self.symbol,
				width = self.precision as usize
			)
		}
	}
}

impl TryFrom<String> for Asset {
	type Error = ValidationError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Asset::parse(&value)
	}
}

impl From<Asset> for String {
	fn from(value: Asset) -> Self {
		value.to_string()
	}
}

/// Validation failures surfaced before any network call is made.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
	#[error("insufficient balance: have {available}, need {requested}")]
	InsufficientBalance {
		available: String,
		requested: String,
	},

	#[error("no active account")]
	NoActiveAccount,

	#[error("no chain provider configured for chain {chain_id}")]
	MissingChainProvider { chain_id: String },

	#[error("no balance of {symbol} for account {account}")]
	UnknownToken { account: String, symbol: String },

	#[error("account {name} not found")]
	UnknownAccount { name: String },

	#[error("account {name} has no key for its active permission")]
	MissingActiveKey { name: String },

	#[error("malformed quantity {input:?}")]
	MalformedQuantity { input: String },
}

/// Failures of the signing-request flow, from parse through dispatch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SigningRequestError {
	#[error("malformed request uri: {reason}")]
	Malformed { reason: String },

	#[error("unsupported request scheme {scheme:?}")]
	UnsupportedScheme { scheme: String },

	#[error("no local account on chain {chain_id}")]
	NoMatchingAccount { chain_id: String },

	#[error("request resolved to zero displayable actions")]
	NoResolvableActions,

	#[error("device authentication failed")]
	AuthenticationFailed,

	#[error("another signing request is already in flight")]
	RequestInFlight,

	#[error("no signing request in flight")]
	NothingInFlight,

	#[error("no session with id {sid}")]
	UnknownSession { sid: String },
}

/// The closed error taxonomy every top-level API reports through.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
	#[error("transport error: {0}")]
	Transport(#[from] reqwest::Error),

	#[error("chain error: {context}")]
	Chain { context: String },

	#[error("history error: {context}")]
	History { context: String },

	#[error("signing request error: {0}")]
	SigningRequest(#[from] SigningRequestError),

	#[error("secret store error: {context}")]
	SecretStore { context: String },

	#[error("storage error: {context}")]
	Storage { context: String },

	#[error("validation error: {0}")]
	Validation(#[from] ValidationError),
}

impl WalletError {
	pub fn chain(context: impl Into<String>) -> Self {
		WalletError::Chain {
			context: context.into(),
		}
	}

	pub fn history(context: impl Into<String>) -> Self {
		WalletError::History {
			context: context.into(),
		}
	}

	pub fn secret_store(context: impl Into<String>) -> Self {
		WalletError::SecretStore {
			context: context.into(),
		}
	}

	pub fn storage(context: impl Into<String>) -> Self {
		WalletError::Storage {
			context: context.into(),
		}
	}
}
