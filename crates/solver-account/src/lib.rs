//! Signer abstraction for the solver's on-chain identities (SPEC_FULL.md §5: "one
//! keystore per runtime; signing serialized per account to avoid nonce races on EVM").
//!
//! `AccountInterface` is deliberately narrow: adapters build the runtime-native,
//! not-yet-signed payload (an EVM `TransactionRequest`, an HC call) and hand this
//! crate only the bytes that need a signature. That keeps the adapter the sole place
//! aware of runtime shape, matching the rest of the canonical data model.

use async_trait::async_trait;
use solver_types::{Address, ConfigSchema, ImplementationRegistry, SecretString};
use thiserror::Error;

pub mod implementations {
	pub mod evm_local;
	pub mod hc_local;
}

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("signing failed: {0}")]
	SigningFailed(String),
	#[error("invalid key: {0}")]
	InvalidKey(String),
	#[error("implementation error: {0}")]
	Implementation(String),
}

/// A runtime-native signature, opaque above the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

impl Signature {
	pub fn to_hex(&self) -> String {
		format!("0x{}", hex::encode(&self.0))
	}
}

/// One signing identity for one chain runtime.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// The canonical 32-byte address this signer signs for.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs an already-serialized, runtime-native transaction payload (e.g. an
	/// RLP-encoded EVM transaction envelope or an HC call digest).
	async fn sign_transaction_bytes(&self, payload: &[u8]) -> Result<Signature, AccountError>;

	/// Signs an arbitrary message (used for off-chain attestations).
	async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError>;

	/// Returns the private key, for implementations (like the EVM delivery adapter)
	/// that need to hand it to a lower-level signer constructor rather than going
	/// through `sign_transaction_bytes`.
	fn get_private_key(&self) -> SecretString;
}

pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::{evm_local, hc_local};

	vec![
		(evm_local::Registry::NAME, evm_local::Registry::factory()),
		(hc_local::Registry::NAME, hc_local::Registry::factory()),
	]
}

/// High-level wrapper used by the rest of the workspace; hides which runtime's
/// signer is behind it.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	pub async fn sign_transaction_bytes(&self, payload: &[u8]) -> Result<Signature, AccountError> {
		self.implementation.sign_transaction_bytes(payload).await
	}

	pub async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError> {
		self.implementation.sign_message(message).await
	}

	pub fn get_private_key(&self) -> SecretString {
		self.implementation.get_private_key()
	}
}
