use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::payments::{AcceptedJetton, AcceptedJettons};
use crate::ton::{Address, AddressError, Network};

/// Longest jetton name the `jetton_transfers` table can hold.
const MAX_JETTON_NAME_LEN: usize = 30;

/// Largest scale a decimal amount can carry.
const MAX_DECIMALS: u32 = 28;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
	/// Human readable, for local development
	Text,
	/// One JSON object per line
	Json,
}

/// Service configuration, read from flags or the environment.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Indexes inbound jetton transfers and completes paid orders", long_about = None)]
pub struct Config {
	/// Ledger network
	#[arg(long, env = "TON_NETWORK", value_enum, default_value_t = Network::Mainnet)]
	pub network: Network,

	/// toncenter v2 endpoint, defaults to the public one of the network
	#[arg(long, env = "TON_API_URL")]
	pub ton_api_url: Option<String>,

	#[arg(long, env = "TON_API_KEY", hide_env_values = true)]
	pub ton_api_key: Option<String>,

	/// JSON array of `{"name", "address", "decimal"}` objects
	#[arg(long, env = "TON_ACCEPTED_JETTONS", default_value = "[]")]
	pub accepted_jettons: String,

	/// tonapi endpoint, defaults to the public one of the network
	#[arg(long, env = "TONAPI_URL")]
	pub tonapi_url: Option<String>,

	#[arg(long, env = "TONAPI_KEY", hide_env_values = true)]
	pub tonapi_key: Option<String>,

	/// Request budget of the tonapi endpoint
	#[arg(long, env = "TONAPI_RPS", default_value_t = 1)]
	pub tonapi_rps: u32,

	#[arg(long, env = "DATABASE_URL", hide_env_values = true)]
	pub database_url: String,

	#[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
	pub database_max_connections: u32,

	/// Apply the embedded migrations at startup
	#[arg(long, env = "RUN_MIGRATIONS")]
	pub run_migrations: bool,

	/// Comma separated merchant addresses
	#[arg(long, env = "TON_RECEIVING_ADDRESSES", value_delimiter = ',')]
	pub receiving_addresses: Vec<String>,

	/// Also read merchant addresses from the mini app payment metadata
	#[arg(long, env = "TON_DISCOVER_ADDRESSES")]
	pub discover_addresses: bool,

	#[arg(long, env = "SYNC_INTERVAL_SECS", default_value_t = 120)]
	pub sync_interval_secs: u64,

	#[arg(long, env = "CHAIN_PAGE_SIZE", default_value_t = 10)]
	pub chain_page_size: usize,

	#[arg(long, env = "INDEXER_PAGE_SIZE", default_value_t = 100)]
	pub indexer_page_size: usize,

	#[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
	pub request_timeout_secs: u64,

	#[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
	pub log_format: LogFormat,
}

/// Error types for configuration
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("Invalid accepted jettons: {0}")]
	JettonsJson(#[from] serde_json::Error),

	#[error("Invalid address {value:?} in {field}: {source}")]
	Address {
		field: &'static str,
		value: String,
		source: AddressError,
	},

	#[error("Invalid {field}: {reason}")]
	Value {
		field: &'static str,
		reason: String,
	},
}

/// One entry of the accepted jettons list
#[derive(Debug, Clone, Deserialize)]
struct AcceptedJettonConfig {
	name: String,
	address: String,
	decimal: u32,
}

impl Config {
	/// Fails on the first setting the service could not run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let positive = [
			("tonapi_rps", self.tonapi_rps as u64),
			("database_max_connections", self.database_max_connections as u64),
			("sync_interval_secs", self.sync_interval_secs),
			("chain_page_size", self.chain_page_size as u64),
			("indexer_page_size", self.indexer_page_size as u64),
			("request_timeout_secs", self.request_timeout_secs),
		];
		for (field, value) in positive {
			if value == 0 {
				return Err(ConfigError::Value {
					field,
					reason: "must be greater than zero".to_string(),
				});
			}
		}
		// consecutive pages share their boundary transaction
		if self.chain_page_size < 2 {
			return Err(ConfigError::Value {
				field: "chain_page_size",
				reason: "must be at least 2".to_string(),
			});
		}

		for address in &self.receiving_addresses {
			address
				.parse::<Address>()
				.map_err(|source| ConfigError::Address {
					field: "receiving_addresses",
					value: address.clone(),
					source,
				})?;
		}

		self.accepted_jettons()?;
		Ok(())
	}

	/// Parses the accepted jettons list.
	pub fn accepted_jettons(&self) -> Result<AcceptedJettons, ConfigError> {
		let entries: Vec<AcceptedJettonConfig> = serde_json::from_str(&self.accepted_jettons)?;
		let mut jettons: Vec<AcceptedJetton> = Vec::with_capacity(entries.len());
		for entry in entries {
			let name = entry.name.trim().to_string();
			if name.is_empty() || name.len() > MAX_JETTON_NAME_LEN {
				return Err(ConfigError::Value {
					field: "accepted_jettons",
					reason: format!("jetton name {:?} must be 1 to {} bytes", name, MAX_JETTON_NAME_LEN),
				});
			}
			if entry.decimal > MAX_DECIMALS {
				return Err(ConfigError::Value {
					field: "accepted_jettons",
					reason: format!("{} has {} decimals, at most {} are supported", name, entry.decimal, MAX_DECIMALS),
				});
			}
			let master = entry
				.address
				.parse::<Address>()
				.map_err(|source| ConfigError::Address {
					field: "accepted_jettons",
					value: entry.address.clone(),
					source,
				})?;
			if jettons.iter().any(|j| j.master == master || j.name == name) {
				return Err(ConfigError::Value {
					field: "accepted_jettons",
					reason: format!("{} is listed twice", name),
				});
			}
			jettons.push(AcceptedJetton {
				name,
				master,
				decimals: entry.decimal,
			});
		}
		Ok(AcceptedJettons::new(jettons))
	}

	pub fn ton_api_url(&self) -> String {
		self.ton_api_url.clone().unwrap_or_else(|| {
			match self.network {
				Network::Mainnet => "https://toncenter.com/api/v2",
				Network::Testnet => "https://testnet.toncenter.com/api/v2",
			}
			.to_string()
		})
	}

	pub fn tonapi_url(&self) -> String {
		self.tonapi_url.clone().unwrap_or_else(|| {
			match self.network {
				Network::Mainnet => "https://tonapi.io",
				Network::Testnet => "https://testnet.tonapi.io",
			}
			.to_string()
		})
	}

	pub fn sync_interval(&self) -> Duration {
		Duration::from_secs(self.sync_interval_secs)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}
}
