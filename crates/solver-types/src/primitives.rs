//! Canonical, runtime-independent data model shared by every component of the solver.
//!
//! Two chain runtimes participate in this system: EVM chains and a Cairo-based
//! heterogeneous chain ("HC"). Everything above the adapter boundary — listeners,
//! admission, the filler, the batcher — works exclusively with the types in this
//! module. Native-shape conversion (20-byte EVM addresses, HC field elements, 128-bit
//! limb pairs) happens only inside adapter implementations.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Opaque 64-bit identifier of a chain in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Bus-level chain identifier used by the interchain messaging layer, distinct from
/// `ChainId` (see SPEC_FULL.md §9, open question 1: the two are independent config inputs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessagingDomain(pub u64);

/// The two transaction/address/amount models this solver bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
	Evm,
	Hc,
}

impl fmt::Display for Runtime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Runtime::Evm => write!(f, "evm"),
			Runtime::Hc => write!(f, "hc"),
		}
	}
}

/// Canonical 32-byte address.
///
/// EVM addresses (20 bytes) are right-aligned with 12 leading zero bytes. HC addresses
/// (field elements, at most 252 bits) are represented big-endian in the same 32 bytes.
/// Invariant: exactly 32 bytes at every interface (SPEC_FULL.md §3 invariant 5).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 32]);

impl Address {
	pub const ZERO: Address = Address([0u8; 32]);

	/// Builds the canonical form from a 20-byte EVM address.
	pub fn from_evm(bytes: [u8; 20]) -> Self {
		let mut out = [0u8; 32];
		out[12..].copy_from_slice(&bytes);
		Address(out)
	}

	/// Recovers the 20-byte EVM address. Fails if any of the 12 padding bytes are non-zero.
	pub fn to_evm(&self) -> Option<[u8; 20]> {
		if self.0[..12].iter().any(|&b| b != 0) {
			return None;
		}
		let mut out = [0u8; 20];
		out.copy_from_slice(&self.0[12..]);
		Some(out)
	}

	/// Builds the canonical form from a 32-byte big-endian HC field element.
	/// The high nibble (4 bits) must be zero: HC field elements are at most 252 bits.
	pub fn from_hc(bytes: [u8; 32]) -> Option<Self> {
		if bytes[0] & 0xf0 != 0 {
			return None;
		}
		Some(Address(bytes))
	}

	/// Recovers the raw HC field-element bytes (identity — HC addresses are already
	/// stored big-endian in the canonical 32-byte form).
	pub fn to_hc(&self) -> [u8; 32] {
		self.0
	}

	pub fn is_zero(&self) -> bool {
		self.0 == [0u8; 32]
	}

	pub fn from_hex(s: &str) -> Result<Self, AddressError> {
		let s = s.trim_start_matches("0x");
		let bytes = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
		if bytes.len() > 32 {
			return Err(AddressError::TooLong(bytes.len()));
		}
		let mut out = [0u8; 32];
		out[32 - bytes.len()..].copy_from_slice(&bytes);
		Ok(Address(out))
	}

	pub fn to_hex(&self) -> String {
		format!("0x{}", hex::encode(self.0))
	}
}

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
	#[error("invalid hex: {0}")]
	InvalidHex(String),
	#[error("address too long: {0} bytes")]
	TooLong(usize),
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Address({})", self.to_hex())
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl Serialize for Address {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for Address {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Address::from_hex(&s).map_err(serde::de::Error::custom)
	}
}

/// Unsigned 256-bit token amount. Crosses the EVM/HC boundary as a pair of 128-bit
/// limbs: `amount = low + (high << 128)`. `high == 0` for values <= 2^128 - 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
	pub const ZERO: TokenAmount = TokenAmount(U256::ZERO);

	pub fn from_u128(v: u128) -> Self {
		TokenAmount(U256::from(v))
	}

	/// Splits into (low, high) 128-bit limbs, each satisfying
	/// `0 <= limb < 2^128` (SPEC_FULL.md §3 invariant 4).
	pub fn to_limbs(&self) -> (u128, u128) {
		let limbs = self.0.as_limbs(); // 4 x u64, little-endian
		let low = (limbs[0] as u128) | ((limbs[1] as u128) << 64);
		let high = (limbs[2] as u128) | ((limbs[3] as u128) << 64);
		(low, high)
	}

	/// Reconstructs an amount from (low, high) 128-bit limbs.
	pub fn from_limbs(low: u128, high: u128) -> Self {
		let mut limbs = [0u64; 4];
		limbs[0] = low as u64;
		limbs[1] = (low >> 64) as u64;
		limbs[2] = high as u64;
		limbs[3] = (high >> 64) as u64;
		TokenAmount(U256::from_limbs(limbs))
	}

	/// Parses a decimal string, or a `0x`-prefixed hex string, into an amount.
	/// Lets callers outside the adapter layer (config loading, CLI flags) build a
	/// `TokenAmount` without depending on `alloy-primitives` directly.
	pub fn from_decimal_or_hex(s: &str) -> Result<Self, String> {
		let v = if let Some(hex) = s.strip_prefix("0x") {
			U256::from_str_radix(hex, 16).map_err(|e| e.to_string())?
		} else {
			U256::from_str_radix(s, 10).map_err(|e| e.to_string())?
		};
		Ok(TokenAmount(v))
	}
}

impl fmt::Display for TokenAmount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for TokenAmount {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.0.to_string())
	}
}

impl<'de> Deserialize<'de> for TokenAmount {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		let v = U256::from_str_radix(s.trim_start_matches("0x"), if s.starts_with("0x") { 16 } else { 10 })
			.map_err(serde::de::Error::custom)?;
		Ok(TokenAmount(v))
	}
}

/// One leg of what the filler must deliver, or what it collects back on origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
	pub token: Address,
	pub amount: TokenAmount,
	pub recipient: Address,
	pub chain_id: ChainId,
}

/// Instructions for filling one destination leg of an order. `origin_data` is opaque
/// and passed verbatim to `destination_settler.fill`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillInstruction {
	pub destination_chain_id: ChainId,
	pub destination_settler: Address,
	#[serde(with = "hex_bytes")]
	pub origin_data: Vec<u8>,
}

/// Canonical, runtime-independent view of a cross-chain order, as decoded from an
/// origin `Open` event by the Event Decoder (SPEC_FULL.md §4.C).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOrder {
	pub user: Address,
	pub origin_chain_id: ChainId,
	pub open_deadline: u64,
	pub fill_deadline: u64,
	/// 32-byte unique id assigned by the origin settler; treated as a primary key.
	pub order_id: [u8; 32],
	pub max_spent: Vec<Output>,
	pub min_received: Vec<Output>,
	pub fill_instructions: Vec<FillInstruction>,
}

impl ResolvedOrder {
	pub fn order_id_hex(&self) -> String {
		format!("0x{}", hex::encode(self.order_id))
	}
}

/// A raw, not-yet-decoded event observed on-chain by an adapter's `scanEvents`.
#[derive(Debug, Clone)]
pub struct RawEvent {
	pub chain_id: ChainId,
	pub block_number: u64,
	pub log_index: u64,
	pub tx_hash: Vec<u8>,
	pub topics: Vec<Vec<u8>>,
	pub data: Vec<u8>,
}

/// Result of decoding a destination-side `Filled` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillEvent {
	pub order_id: [u8; 32],
	pub filler: Address,
	pub fill_tx_ref: String,
}

/// Order status codes read back from a settler contract via `queryOrderStatus`,
/// encoded on-wire as short ASCII strings padded to 32 bytes, compared as opaque values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatusCode {
	Unknown,
	Opened,
	Filled,
	Settled,
	Refunded,
}

impl OrderStatusCode {
	pub fn is_filled_or_later(&self) -> bool {
		matches!(
			self,
			OrderStatusCode::Filled | OrderStatusCode::Settled | OrderStatusCode::Refunded
		)
	}
}

mod hex_bytes {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&format!("0x{}", hex::encode(bytes)))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
		let s = String::deserialize(d)?;
		hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn evm_address_round_trip() {
		let raw: [u8; 20] = [
			0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
			0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
		];
		let addr = Address::from_evm(raw);
		assert_eq!(addr.to_evm(), Some(raw));
	}

	#[test]
	fn hc_address_round_trip() {
		let mut raw = [0x0Fu8; 32];
		raw[0] = 0x0A; // high nibble zero
		let addr = Address::from_hc(raw).expect("valid HC address");
		assert_eq!(addr.to_hc(), raw);
	}

	#[test]
	fn hc_address_rejects_high_nibble() {
		let mut raw = [0u8; 32];
		raw[0] = 0x10;
		assert!(Address::from_hc(raw).is_none());
	}

	#[test]
	fn amount_limb_round_trip_small() {
		for x in [0u128, 1, 42, u128::MAX] {
			let amt = TokenAmount::from_u128(x);
			let (low, high) = amt.to_limbs();
			assert_eq!(high, 0);
			assert_eq!(TokenAmount::from_limbs(low, high), amt);
		}
	}

	#[test]
	fn amount_limb_round_trip_at_two_pow_128() {
		let amt = TokenAmount(U256::from(1u8) << 128);
		let (low, high) = amt.to_limbs();
		assert_eq!(low, 0);
		assert_eq!(high, 1);
		assert_eq!(TokenAmount::from_limbs(low, high), amt);
	}

	#[test]
	fn amount_limb_round_trip_max_u256() {
		let amt = TokenAmount(U256::MAX);
		let (low, high) = amt.to_limbs();
		assert_eq!(low, u128::MAX);
		assert_eq!(high, u128::MAX);
		assert_eq!(TokenAmount::from_limbs(low, high), amt);
	}

	#[test]
	fn address_hex_round_trip() {
		let addr = Address::from_hex("0x000000000000000000000000AAbbCCddEEff010203040506070809").unwrap();
		let hex = addr.to_hex();
		let parsed = Address::from_hex(&hex).unwrap();
		assert_eq!(addr, parsed);
	}
}
