//! Local HC signer.
//!
//! There is no Cairo/Starknet signing crate anywhere in this workspace's dependency
//! pack, so this implements a placeholder signature scheme: the "signature" is a
//! keccak256 MAC over the payload keyed by the private key, which lets the rest of
//! the system (idempotency gates, retries, logging) exercise the same code paths an
//! HC transaction would take without depending on a real STARK-curve signer crate.
//! Swapping this for a real HC signer means replacing only this file.

use alloy_primitives::keccak256;
use async_trait::async_trait;
use solver_types::{
	Address, ConfigSchema, Field, FieldType, Schema, SecretString, ValidationError,
};

use crate::{AccountError, AccountInterface, Signature};

pub struct HcLocalSigner {
	private_key: SecretString,
	address: Address,
}

impl HcLocalSigner {
	pub fn new(private_key: SecretString, address_hex: &str) -> Result<Self, AccountError> {
		let address =
			Address::from_hex(address_hex).map_err(|e| AccountError::InvalidKey(e.to_string()))?;
		Ok(HcLocalSigner {
			private_key,
			address,
		})
	}

	fn mac(&self, payload: &[u8]) -> Vec<u8> {
		let mut buf = Vec::with_capacity(payload.len() + self.private_key.len());
		buf.extend_from_slice(self.private_key.expose_secret().as_bytes());
		buf.extend_from_slice(payload);
		keccak256(&buf).to_vec()
	}
}

#[async_trait]
impl AccountInterface for HcLocalSigner {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HcLocalSignerSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.address)
	}

	async fn sign_transaction_bytes(&self, payload: &[u8]) -> Result<Signature, AccountError> {
		Ok(Signature(self.mac(payload)))
	}

	async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError> {
		Ok(Signature(self.mac(message)))
	}

	fn get_private_key(&self) -> SecretString {
		self.private_key.clone()
	}
}

pub struct HcLocalSignerSchema;

impl ConfigSchema for HcLocalSignerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("private_key", FieldType::String),
				Field::new("address", FieldType::String),
			],
			vec![],
		);
		schema.validate(config)
	}
}

pub fn create_hc_local(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	HcLocalSignerSchema
		.validate(config)
		.map_err(|e| AccountError::Implementation(format!("invalid configuration: {}", e)))?;

	let key_str = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidKey("missing private_key".into()))?;
	let address_str = config
		.get("address")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidKey("missing address".into()))?;

	Ok(Box::new(HcLocalSigner::new(
		SecretString::from(key_str.to_string()),
		address_str,
	)?))
}

pub struct Registry;

impl solver_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "hc_local";
	type Factory = crate::AccountFactory;

	fn factory() -> Self::Factory {
		create_hc_local
	}
}

impl crate::AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn signs_deterministically() {
		let signer = HcLocalSigner::new(
			SecretString::from("test-key".to_string()),
			"0x0a1234567890123456789012345678901234567890123456789012345678",
		)
		.unwrap();
		let sig1 = signer.sign_message(b"payload").await.unwrap();
		let sig2 = signer.sign_message(b"payload").await.unwrap();
		assert_eq!(sig1, sig2);
	}
}
