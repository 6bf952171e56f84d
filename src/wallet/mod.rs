pub mod context;
pub mod events;
pub mod persistence;
pub mod store;
pub mod sync;
pub mod types;

pub use context::WalletContext;
pub use types::*;

use rand::Rng;

/// Generate a fresh random private key, hex encoded.
pub fn generate_private_key() -> String {
	let mut secret = [0u8; 32];
	rand::rng().fill(&mut secret);
	hex::encode(secret)
}
