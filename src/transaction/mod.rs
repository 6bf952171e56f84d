/// Transaction construction
pub mod builder;
/// Vault-backed digest signing
pub mod signer;

pub use builder::{
	SignedTransaction, Transaction, TransactionBuilder, TransactionError, TxAction,
};
pub use signer::TransactionSigner;

/// Seconds a freshly built transaction stays valid past the chain head time.
pub const TRANSACTION_EXPIRE_SECONDS: i64 = 60;
