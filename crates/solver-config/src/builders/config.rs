//! Configuration builder for creating test and development configurations.
//!
//! Provides a fluent way to construct `Config` values with sensible defaults,
//! avoiding hand-written TOML in every unit test.

use crate::{
	AdmissionConfig, ApiConfig, ChainConfig, Config, RuntimeKind, SolverConfig, StorageConfig,
};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	solver_id: String,
	monitoring_timeout_minutes: u64,
	chains: Vec<ChainConfig>,
	checkpoint_path: String,
	cleanup_interval_seconds: u64,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` seeded with a two-chain EVM/HC pair, which is
	/// the minimum `Config::validate` accepts.
	pub fn new() -> Self {
		Self {
			solver_id: "test-solver".to_string(),
			monitoring_timeout_minutes: 1,
			chains: vec![
				ChainConfig {
					name: "origin".to_string(),
					runtime: RuntimeKind::Evm,
					rpc_url: "http://localhost:8545".to_string(),
					chain_id: 1,
					messaging_domain: 1,
					settler_address: "0x1234567890123456789012345678901234567890".to_string(),
					poll_interval_ms: 1000,
					confirmation_blocks: 2,
					max_block_range: 500,
					start_block: 0,
				},
				ChainConfig {
					name: "destination".to_string(),
					runtime: RuntimeKind::Hc,
					rpc_url: "http://localhost:6060".to_string(),
					chain_id: 2,
					messaging_domain: 2,
					settler_address: "0x09876543210987654321098765432109876543210".to_string(),
					poll_interval_ms: 2000,
					confirmation_blocks: 2,
					max_block_range: 100,
					start_block: 0,
				},
			],
			checkpoint_path: "/tmp/test-checkpoint.json".to_string(),
			cleanup_interval_seconds: 60,
			api: None,
		}
	}

	pub fn solver_id(mut self, id: String) -> Self {
		self.solver_id = id;
		self
	}

	pub fn monitoring_timeout_minutes(mut self, timeout: u64) -> Self {
		self.monitoring_timeout_minutes = timeout;
		self
	}

	pub fn chains(mut self, chains: Vec<ChainConfig>) -> Self {
		self.chains = chains;
		self
	}

	pub fn checkpoint_path(mut self, path: String) -> Self {
		self.checkpoint_path = path;
		self
	}

	pub fn cleanup_interval_seconds(mut self, interval: u64) -> Self {
		self.cleanup_interval_seconds = interval;
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	pub fn build(self) -> Config {
		Config {
			solver: SolverConfig {
				id: self.solver_id,
				monitoring_timeout_minutes: self.monitoring_timeout_minutes,
				signers: HashMap::new(),
			},
			chains: self.chains,
			solvers: HashMap::new(),
			admission: AdmissionConfig::default(),
			storage: StorageConfig {
				checkpoint_path: self.checkpoint_path,
				cleanup_interval_seconds: self.cleanup_interval_seconds,
			},
			log_level: None,
			log_format: None,
			api: self.api,
		}
	}
}
