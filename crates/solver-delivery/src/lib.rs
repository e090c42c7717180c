//! Chain Adapter (SPEC_FULL.md §4.A) plus the embedded Event Decoder (§4.C).
//!
//! A `ChainAdapter` abstracts one chain behind a small operation set; everything
//! above this boundary — the listener, admission, the filler, the batcher — works
//! exclusively with the canonical types in `solver_types`. Native-shape conversion
//! (20-byte EVM addresses, HC field elements, 128-bit limb pairs) happens only here.

use async_trait::async_trait;
use solver_types::{Address, ChainId, FillEvent, OrderStatusCode, RawEvent, ResolvedOrder, TokenAmount};
use thiserror::Error;

pub mod decode;
pub mod implementations {
	pub mod evm;
	pub mod hc;
}

/// A runtime-specific reference to a submitted transaction (tx hash on EVM, a
/// transaction/message id on HC).
pub type TxRef = String;

#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error("RPC error: {0}")]
	Rpc(String),
	#[error("transaction failed: {0}")]
	TransactionFailed(String),
	#[error("decode error: {0}")]
	Decode(String),
	#[error("timed out waiting for transaction {0}")]
	Timeout(String),
	#[error("invalid configuration: {0}")]
	Configuration(String),
}

/// Abstracts one chain (one EVM network, or the HC network) behind a small,
/// runtime-agnostic operation set (SPEC_FULL.md §4.A).
#[async_trait]
pub trait ChainAdapter: Send + Sync {
	fn chain_id(&self) -> ChainId;

	/// Current chain tip (latest block / equivalent height).
	async fn tip(&self) -> Result<u64, DeliveryError>;

	/// Scans `[fromBlock, toBlock]` (inclusive) on `contract` for events matching
	/// `topics[0]` (the event signature hash). Callers are responsible for respecting
	/// the adapter's `MaxBlockRange` by chunking calls.
	async fn scan_events(
		&self,
		contract: Address,
		topics: Vec<[u8; 32]>,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<RawEvent>, DeliveryError>;

	/// Submits a fill on this (destination) chain. Waits until mined or timeout.
	async fn submit_fill(
		&self,
		settler: Address,
		order_id: [u8; 32],
		origin_data: &[u8],
		filler_data: &[u8],
	) -> Result<TxRef, DeliveryError>;

	/// Submits a settlement batch on this (destination) chain.
	async fn submit_settle(
		&self,
		settler: Address,
		order_ids: &[[u8; 32]],
		fee_value: TokenAmount,
	) -> Result<TxRef, DeliveryError>;

	async fn erc20_balance(&self, token: Address, holder: Address) -> Result<TokenAmount, DeliveryError>;

	async fn erc20_allowance(
		&self,
		token: Address,
		holder: Address,
		spender: Address,
	) -> Result<TokenAmount, DeliveryError>;

	async fn erc20_approve(
		&self,
		token: Address,
		spender: Address,
		amount: TokenAmount,
	) -> Result<TxRef, DeliveryError>;

	async fn query_order_status(
		&self,
		settler: Address,
		order_id: [u8; 32],
	) -> Result<OrderStatusCode, DeliveryError>;
}

/// Decodes a raw, not-yet-interpreted log into the canonical data model. Implemented
/// per runtime since EVM and HC use different wire layouts for the same semantics
/// (SPEC_FULL.md §4.C).
pub trait EventDecoder: Send + Sync {
	fn decode_open(&self, raw: &RawEvent) -> Result<ResolvedOrder, DeliveryError>;
	fn decode_filled(&self, raw: &RawEvent) -> Result<FillEvent, DeliveryError>;

	/// Topic (event signature hash, or the HC equivalent tag) a listener filters
	/// `scan_events` on to find `Open`/`Filled` events, so the listener stays
	/// runtime-agnostic about how a given event is identified on the wire.
	fn open_topic(&self) -> [u8; 32];
	fn filled_topic(&self) -> [u8; 32];
}
