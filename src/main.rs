mod config;
mod esr;
mod rpc;
mod transaction;
mod utils;
mod vault;
mod wallet;

use crate::config::Config;
use crate::esr::{AlwaysAllowGate, RequestDisposition};
use crate::vault::FileKeyVault;
use crate::wallet::WalletContext;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive("wallet_state_sync=debug".parse().unwrap())
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting wallet state sync engine");

	let config = Config::load();
	let vault = Arc::new(FileKeyVault::new(config.data_dir.join("vault")));
	let context = WalletContext::new(config, vault, Arc::new(AlwaysAllowGate));

	info!("Created wallet context");

	if let Err(e) = context.restore().await {
		error!("Failed to restore persisted state: {:?}", e);
		return;
	}

	info!("Restored persisted state");

	// Optionally import a key before syncing.
	if let Ok(private_key) = std::env::var("WALLET_IMPORT_KEY") {
		let chain_id = context
			.stores()
			.chain_providers
			.all()
			.first()
			.map(|p| p.chain_id.clone());
		match chain_id {
			Some(chain_id) => match context.import_account(&chain_id, &private_key).await {
				Ok(accounts) => info!("Imported {} account(s)", accounts.len()),
				Err(e) => {
					error!("Failed to import account: {:?}", e);
					return;
				}
			},
			None => {
				error!("No chain provider configured");
				return;
			}
		}
	} else if context.stores().accounts.is_empty() {
		info!(
			"No accounts known. Set WALLET_IMPORT_KEY to import one; fresh example key: {}",
			wallet::generate_private_key()
		);
	}

	// Refresh every known account and report what arrived.
	match context.sync_all().await {
		Ok(report) => info!("{}", report.summary()),
		Err(e) => {
			error!("Sync run failed: {:?}", e);
			return;
		}
	}

	for balance in context.stores().token_balances.all() {
		info!("Balance {}: {}", balance.account, balance.amount);
	}

	// A signing-request URI passed as the first argument is resolved, signed,
	// and dispatched.
	if let Some(uri) = std::env::args().nth(1) {
		info!("Handling signing request");

		if let Err(e) = context.handle_request(&uri).await {
			error!("Failed to parse signing request: {:?}", e);
			return;
		}

		match context.accept_request().await {
			Ok(RequestDisposition::Opened { url }) => {
				info!("Signed. Open callback to finish: {}", url);
			}
			Ok(RequestDisposition::Completed) => {
				info!("Signed and dispatched");
			}
			Err(e) => {
				error!("Failed to accept signing request: {:?}", e);
			}
		}
	}
}
