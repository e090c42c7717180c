//! Local EVM signer backed by a raw private key held in memory.
//!
//! Grounded on the `PrivateKeySigner` construction used by the EVM chain adapter's
//! provider builder; kept here as a standalone signer so `AccountService` can hand
//! out signatures without owning a provider.

use alloy_primitives::hex as alloy_hex;
use alloy_signer::Signer as AlloySigner;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use solver_types::{
	Address, ConfigSchema, Field, FieldType, Schema, SecretString, ValidationError,
};

use crate::{AccountError, AccountInterface, Signature};

pub struct EvmLocalSigner {
	signer: PrivateKeySigner,
	private_key: SecretString,
}

impl EvmLocalSigner {
	pub fn new(private_key: SecretString) -> Result<Self, AccountError> {
		let hex_key = private_key.expose_secret();
		let trimmed = hex_key.trim_start_matches("0x");
		let signer: PrivateKeySigner = trimmed
			.parse()
			.map_err(|e| AccountError::InvalidKey(format!("{}", e)))?;
		Ok(EvmLocalSigner {
			signer,
			private_key,
		})
	}
}

#[async_trait]
impl AccountInterface for EvmLocalSigner {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EvmLocalSignerSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(Address::from_evm(self.signer.address().into_array()))
	}

	async fn sign_transaction_bytes(&self, payload: &[u8]) -> Result<Signature, AccountError> {
		let sig = self
			.signer
			.sign_message(payload)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(Signature(sig.as_bytes().to_vec()))
	}

	async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError> {
		let sig = self
			.signer
			.sign_message(message)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(Signature(sig.as_bytes().to_vec()))
	}

	fn get_private_key(&self) -> SecretString {
		self.private_key.clone()
	}
}

pub struct EvmLocalSignerSchema;

impl ConfigSchema for EvmLocalSignerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("private_key", FieldType::String)],
			vec![],
		);
		schema.validate(config)
	}
}

pub fn create_evm_local(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	EvmLocalSignerSchema
		.validate(config)
		.map_err(|e| AccountError::Implementation(format!("invalid configuration: {}", e)))?;

	let key_str = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidKey("missing private_key".into()))?;

	let _ = alloy_hex::decode(key_str.trim_start_matches("0x"))
		.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

	Ok(Box::new(EvmLocalSigner::new(SecretString::from(
		key_str.to_string(),
	))?))
}

pub struct Registry;

impl solver_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_local";
	type Factory = crate::AccountFactory;

	fn factory() -> Self::Factory {
		create_evm_local
	}
}

impl crate::AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn address_is_deterministic_for_key() {
		let key = SecretString::from(
			"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string(),
		);
		let signer = EvmLocalSigner::new(key).unwrap();
		let addr1 = signer.address().await.unwrap();
		let addr2 = signer.address().await.unwrap();
		assert_eq!(addr1, addr2);
		assert!(addr1.to_evm().is_some());
	}
}
