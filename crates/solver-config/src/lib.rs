//! Configuration for the cross-chain solver.
//!
//! Provides structures and utilities for loading solver configuration from TOML,
//! with `${VAR}` / `${VAR:-default}` environment-variable interpolation resolved
//! before parsing, and descriptive field-by-field validation after.

pub mod builders;
pub mod loader;

pub use loader::ConfigLoader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use solver_types::SecretString;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level solver configuration (SPEC_FULL.md §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub solver: SolverConfig,
	#[serde(default)]
	pub chains: Vec<ChainConfig>,
	#[serde(default)]
	pub solvers: HashMap<String, SolverModuleConfig>,
	#[serde(default)]
	pub admission: AdmissionConfig,
	#[serde(default)]
	pub settlement: SettlementConfig,
	pub storage: StorageConfig,
	#[serde(default)]
	pub log_level: Option<String>,
	#[serde(default)]
	pub log_format: Option<String>,
	pub api: Option<ApiConfig>,
}

/// Identity and signing credentials for this solver instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolverConfig {
	pub id: String,
	#[serde(default = "default_monitoring_timeout_minutes")]
	pub monitoring_timeout_minutes: u64,
	/// Signing credentials keyed by runtime name (`"evm"`, `"hc"`).
	#[serde(default)]
	pub signers: HashMap<String, SignerConfig>,
	/// Retry ceiling for a single fill leg's transient-failure backoff loop
	/// (SPEC_FULL.md §4.F step 4: "retry with exponential backoff up to N attempts").
	#[serde(default = "default_fill_max_attempts")]
	pub fill_max_attempts: u32,
}

fn default_monitoring_timeout_minutes() -> u64 {
	480
}

fn default_fill_max_attempts() -> u32 {
	5
}

/// One runtime's signing credentials. Exactly one of `private_key`/`keystore` is
/// expected to be set; which is enforced by [`Config::validate`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignerConfig {
	pub private_key: Option<SecretString>,
	pub keystore: Option<String>,
	/// HC signers carry no key-derivable address (there is no STARK-curve signer in
	/// this workspace's dependency pack, see `solver-account`'s `hc_local` module);
	/// the operator supplies the HC address this key is provisioned for directly.
	/// Unused for `"evm"` entries, whose address is always derived from the key.
	#[serde(default)]
	pub address: Option<String>,
}

/// Which chain runtime a chain entry targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
	Evm,
	Hc,
}

/// One chain in the fleet (SPEC_FULL.md §4.A, §4.D, §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	pub name: String,
	pub runtime: RuntimeKind,
	pub rpc_url: String,
	pub chain_id: u64,
	pub messaging_domain: u64,
	pub settler_address: String,
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_confirmation_blocks")]
	pub confirmation_blocks: u64,
	#[serde(default = "default_max_block_range")]
	pub max_block_range: u64,
	#[serde(default)]
	pub start_block: u64,
	/// Interchain fee value passed to `submitSettle` when this chain is the
	/// destination of a settlement batch, as a base-10 string (parsed into a
	/// `TokenAmount` by the caller). Defaults to zero.
	#[serde(default)]
	pub settle_fee_value: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
	1000
}
fn default_confirmation_blocks() -> u64 {
	2
}
fn default_max_block_range() -> u64 {
	500
}

impl ChainConfig {
	/// Per-runtime listener defaults, applied by callers that skip the config
	/// defaults above (e.g. `tools open-order`); EVM: ~1000ms/500 blocks/2
	/// confirmations, HC: ~2000ms/100 blocks/2 confirmations (SPEC_FULL.md §4.D).
	pub fn runtime_defaults(runtime: RuntimeKind) -> (u64, u64, u64) {
		match runtime {
			RuntimeKind::Evm => (1000, 500, 2),
			RuntimeKind::Hc => (2000, 100, 2),
		}
	}
}

/// Toggle for whether the filler is active on a given chain.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct SolverModuleConfig {
	#[serde(default)]
	pub enabled: bool,
}

/// Wildcard-capable allow/block list entry as written in config.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ListEntryConfig {
	#[serde(default)]
	pub sender_address: Option<String>,
	#[serde(default)]
	pub destination_domain: Option<u64>,
	#[serde(default)]
	pub recipient_address: Option<String>,
}

/// Admission rule configuration (SPEC_FULL.md §4.E).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdmissionConfig {
	#[serde(default)]
	pub allow_list: Vec<ListEntryConfig>,
	#[serde(default)]
	pub block_list: Vec<ListEntryConfig>,
	#[serde(default = "default_min_fill_deadline_headroom_seconds")]
	pub min_fill_deadline_headroom_seconds: u64,
}

fn default_min_fill_deadline_headroom_seconds() -> u64 {
	60
}

/// Batcher cadence configuration (SPEC_FULL.md §4.G: "configurable cadence, or when
/// the queue reaches batchMax").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettlementConfig {
	#[serde(default = "default_settlement_batch_max")]
	pub batch_max: usize,
	#[serde(default = "default_settlement_cadence_seconds")]
	pub cadence_seconds: u64,
}

impl Default for SettlementConfig {
	fn default() -> Self {
		SettlementConfig {
			batch_max: default_settlement_batch_max(),
			cadence_seconds: default_settlement_cadence_seconds(),
		}
	}
}

fn default_settlement_batch_max() -> usize {
	10
}
fn default_settlement_cadence_seconds() -> u64 {
	30
}

/// Configuration for the checkpoint store backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	pub checkpoint_path: String,
	#[serde(default = "default_cleanup_interval_seconds")]
	pub cleanup_interval_seconds: u64,
}

fn default_cleanup_interval_seconds() -> u64 {
	3600
}

/// Configuration for the read-only HTTP surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}
fn default_api_port() -> u16 {
	3000
}

/// Resolves `${VAR}` / `${VAR:-default}` references against the process
/// environment. Input is size-capped to guard against ReDoS on pathological
/// configuration files.
pub fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			}
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	pub fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		let resolved = resolve_env_vars(&content)?;
		resolved.parse()
	}

	/// Async-ready variant for future secret backends (Vault, KMS); currently
	/// delegates to the sync path.
	pub async fn from_file_async(path: &str) -> Result<Self, ConfigError> {
		Self::from_file(path)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.solver.id.is_empty() {
			return Err(ConfigError::Validation("Solver ID cannot be empty".into()));
		}

		if self.chains.is_empty() {
			return Err(ConfigError::Validation(
				"At least one chain must be configured".into(),
			));
		}
		if self.chains.len() < 2 {
			return Err(ConfigError::Validation(
				"At least 2 chains must be configured to bridge value".into(),
			));
		}

		let mut seen_names = std::collections::HashSet::new();
		for chain in &self.chains {
			if chain.name.is_empty() {
				return Err(ConfigError::Validation("Chain name cannot be empty".into()));
			}
			if !seen_names.insert(chain.name.clone()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate chain name '{}'",
					chain.name
				)));
			}
			if chain.settler_address.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Chain '{}' must have settler_address",
					chain.name
				)));
			}
			if chain.max_block_range == 0 {
				return Err(ConfigError::Validation(format!(
					"Chain '{}' max_block_range must be greater than 0",
					chain.name
				)));
			}
		}

		for (name, module) in &self.solvers {
			if module.enabled && !seen_names.contains(name) {
				return Err(ConfigError::Validation(format!(
					"solvers.{} enabled but no chain named '{}' is configured",
					name, name
				)));
			}
		}

		if self.storage.checkpoint_path.is_empty() {
			return Err(ConfigError::Validation(
				"storage.checkpoint_path cannot be empty".into(),
			));
		}
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"storage.cleanup_interval_seconds must be greater than 0".into(),
			));
		}

		if self.admission.min_fill_deadline_headroom_seconds == 0 {
			return Err(ConfigError::Validation(
				"admission.min_fill_deadline_headroom_seconds must be greater than 0".into(),
			));
		}

		if self.settlement.batch_max == 0 {
			return Err(ConfigError::Validation(
				"settlement.batch_max must be greater than 0".into(),
			));
		}

		if let Some(level) = &self.log_level {
			if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
				return Err(ConfigError::Validation(format!(
					"Invalid log_level '{}'",
					level
				)));
			}
		}
		if let Some(format) = &self.log_format {
			if !["text", "json"].contains(&format.as_str()) {
				return Err(ConfigError::Validation(format!(
					"Invalid log_format '{}'",
					format
				)));
			}
		}

		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_config(solver_id: &str) -> String {
		format!(
			r#"
[solver]
id = "{solver_id}"
monitoring_timeout_minutes = 5

[[chains]]
name = "origin"
runtime = "evm"
rpc_url = "http://localhost:8545"
chain_id = 1
messaging_domain = 1
settler_address = "0x1234567890123456789012345678901234567890"

[[chains]]
name = "destination"
runtime = "hc"
rpc_url = "http://localhost:6060"
chain_id = 2
messaging_domain = 2
settler_address = "0x09876543210987654321098765432109876543210"

[storage]
checkpoint_path = "/tmp/checkpoint.json"
cleanup_interval_seconds = 3600
"#
		)
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TEST_HOST", "localhost");
		std::env::set_var("TEST_PORT", "5432");
		let input = "host = \"${TEST_HOST}:${TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");
		std::env::remove_var("TEST_HOST");
		std::env::remove_var("TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
	}

	#[test]
	fn test_minimal_config_parses() {
		let config: Config = base_config("test-solver").parse().unwrap();
		assert_eq!(config.solver.id, "test-solver");
		assert_eq!(config.chains.len(), 2);
		assert_eq!(config.chains[1].runtime, RuntimeKind::Hc);
	}

	#[test]
	fn test_single_chain_rejected() {
		let mut cfg = base_config("test-solver");
		// truncate to remove the second chain block
		let idx = cfg.find("[storage]").unwrap();
		let second_chain_idx = cfg.rfind("[[chains]]").unwrap();
		cfg.replace_range(second_chain_idx..idx, "");
		let result: Result<Config, _> = cfg.parse();
		assert!(result.is_err());
	}

	#[test]
	fn test_config_with_env_var_solver_id() {
		std::env::set_var("TEST_SOLVER_ID", "env-solver");
		let config: Config = base_config("${TEST_SOLVER_ID}").parse().unwrap();
		assert_eq!(config.solver.id, "env-solver");
		std::env::remove_var("TEST_SOLVER_ID");
	}
}
