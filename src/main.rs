mod chain;
mod config;
mod indexer;
mod payments;
mod scheduler;
mod ton;
mod utils;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::chain::{ChainError, TonCenterClient};
use crate::config::{Config, ConfigError, LogFormat};
use crate::indexer::{IndexerError, TonApiClient};
use crate::payments::StoreError;
use crate::payments::sync::repositories::{AddressSource, PgStore, StaticAddresses};
use crate::payments::sync::{ScanSettings, SyncEngine};
use crate::scheduler::{PaymentSyncJob, Scheduler};
use crate::ton::AddressCodec;

/// Error types for startup
#[derive(Debug, thiserror::Error)]
enum StartupError {
	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),

	#[error("Database error: {0}")]
	Store(#[from] StoreError),

	#[error("Chain client error: {0}")]
	Chain(#[from] ChainError),

	#[error("Indexer client error: {0}")]
	Indexer(#[from] IndexerError),
}

#[tokio::main]
async fn main() -> ExitCode {
	let config = Config::parse();
	init_tracing(config.log_format);

	match run(config).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("Failed to start jetton payment sync: {}", e);
			ExitCode::FAILURE
		}
	}
}

fn init_tracing(format: LogFormat) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	match format {
		LogFormat::Text => tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_target(false)
			.with_thread_ids(false)
			.with_thread_names(false)
			.with_file(false)
			.with_line_number(false)
			.init(),
		LogFormat::Json => tracing_subscriber::fmt()
			.json()
			.with_env_filter(filter)
			.with_target(false)
			.with_thread_ids(false)
			.with_thread_names(false)
			.with_file(false)
			.with_line_number(false)
			.init(),
	}
}

async fn run(config: Config) -> Result<(), StartupError> {
	config.validate()?;
	let jettons = config.accepted_jettons()?;
	let codec = AddressCodec::new(config.network);

	info!(
		"Starting jetton payment sync on {} with {} accepted jettons",
		config.network,
		jettons.len()
	);
	if jettons.is_empty() {
		warn!("No accepted jettons configured, no transfer will match");
	}

	let store = Arc::new(
		PgStore::connect(&config.database_url, config.database_max_connections).await?,
	);
	if config.run_migrations {
		store.migrate().await?;
	}
	info!("Connected to database");

	let chain = TonCenterClient::new(
		config.ton_api_url(),
		config.ton_api_key.clone(),
		config.request_timeout(),
	)?;
	let indexer = TonApiClient::new(
		config.tonapi_url(),
		config.tonapi_key.clone(),
		config.tonapi_rps,
		config.request_timeout(),
	)?;
	info!(
		"Using {} as primary and {} as fallback source",
		config.ton_api_url(),
		config.tonapi_url()
	);

	let engine = SyncEngine::new(
		codec,
		Arc::new(chain),
		Arc::new(indexer),
		store.clone(),
		jettons,
		ScanSettings {
			chain_page_size: config.chain_page_size,
			indexer_page_size: config.indexer_page_size,
		},
	);

	let mut sources: Vec<Arc<dyn AddressSource>> = vec![Arc::new(StaticAddresses::new(
		config.receiving_addresses.clone(),
	))];
	if config.discover_addresses {
		sources.push(store.clone());
	} else if config.receiving_addresses.is_empty() {
		warn!("No receiving addresses configured and discovery is disabled");
	}

	let cancel = CancellationToken::new();
	let shutdown = cancel.clone();
	tokio::spawn(async move {
		match tokio::signal::ctrl_c().await {
			Ok(()) => {
				info!("Shutdown requested, waiting for the current run to finish");
				shutdown.cancel();
			}
			Err(e) => error!("Failed to listen for the shutdown signal: {}", e),
		}
	});

	let mut scheduler = Scheduler::new();
	scheduler.register(
		Arc::new(PaymentSyncJob::new(Arc::new(engine), sources, codec)),
		config.sync_interval(),
	);
	scheduler.run(cancel).await;

	Ok(())
}
