//! EVM chain adapter. Grounded on the `ProviderBuilder`/wallet wiring in the
//! teacher's Alloy delivery implementation and the `sol!` ABI definitions used by
//! its order/discovery implementations.

use crate::decode::validate_resolved_order;
use crate::{ChainAdapter, DeliveryError, EventDecoder, TxRef};
use alloy_network::EthereumWallet;
use alloy_primitives::{Address as AlloyAddress, Bytes, FixedBytes, Log as PrimLog, LogData, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types::{Filter, Log, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, SolCall, SolEvent, SolValue};
use alloy_transport_http::Http;
use async_trait::async_trait;
use solver_types::{
	Address, ChainId, FillEvent, FillInstruction, OrderStatusCode, RawEvent, ResolvedOrder,
	SecretString, TokenAmount,
};
use std::sync::Arc;
use std::time::Duration;

sol! {
	struct SolMandateOutput {
		bytes32 oracle;
		bytes32 settler;
		uint256 chainId;
		bytes32 token;
		uint256 amount;
		bytes32 recipient;
		bytes call;
		bytes context;
	}

	struct StandardOrder {
		address user;
		uint256 nonce;
		uint256 originChainId;
		uint32 expires;
		uint32 fillDeadline;
		address inputOracle;
		uint256[2][] inputs;
		SolMandateOutput[] outputs;
	}

	event Open(bytes32 indexed orderId, bytes order);
	event Filled(bytes32 indexed orderId, bytes32 filler);

	interface IDestinationSettler {
		function fill(bytes32 orderId, bytes originData, bytes fillerData) external;
		function settle(bytes32[] orderIds, uint256 feeValue) external;
		function orderStatus(bytes32 orderId) external view returns (bytes32);
	}

	interface IERC20 {
		function balanceOf(address owner) external view returns (uint256);
		function allowance(address owner, address spender) external view returns (uint256);
		function approve(address spender, uint256 amount) external returns (bool);
	}
}

const MAX_WAIT_SECS: u64 = 120;
const POLL_INTERVAL: Duration = Duration::from_secs(3);

pub struct EvmAdapter {
	chain_id: ChainId,
	provider: Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
}

impl EvmAdapter {
	pub fn new(chain_id: ChainId, rpc_url: &str, private_key: &SecretString) -> Result<Self, DeliveryError> {
		let url = rpc_url
			.parse()
			.map_err(|e| DeliveryError::Configuration(format!("invalid rpc url: {}", e)))?;

		let signer: PrivateKeySigner = private_key
			.expose_secret()
			.trim_start_matches("0x")
			.parse()
			.map_err(|e| DeliveryError::Configuration(format!("invalid private key: {}", e)))?;
		let signer = signer.with_chain_id(Some(chain_id.0));
		let wallet = EthereumWallet::from(signer);

		let provider = ProviderBuilder::new()
			.with_recommended_fillers()
			.wallet(wallet)
			.on_http(url);

		Ok(EvmAdapter {
			chain_id,
			provider: Arc::new(provider),
		})
	}

	fn provider(&self) -> &(dyn Provider<Http<reqwest::Client>> + Send + Sync) {
		self.provider.as_ref()
	}

	async fn wait_for_receipt(&self, tx_hash: FixedBytes<32>) -> Result<(), DeliveryError> {
		let start = tokio::time::Instant::now();
		loop {
			if start.elapsed() > Duration::from_secs(MAX_WAIT_SECS) {
				return Err(DeliveryError::Timeout(format!("0x{}", hex::encode(tx_hash))));
			}
			match self.provider().get_transaction_receipt(tx_hash).await {
				Ok(Some(receipt)) => {
					return if receipt.status() {
						Ok(())
					} else {
						Err(DeliveryError::TransactionFailed(format!(
							"0x{} reverted",
							hex::encode(tx_hash)
						)))
					};
				}
				Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
				Err(e) => return Err(DeliveryError::Rpc(e.to_string())),
			}
		}
	}

	fn to_alloy_address(addr: Address) -> Result<AlloyAddress, DeliveryError> {
		addr.to_evm()
			.map(AlloyAddress::from)
			.ok_or_else(|| DeliveryError::Configuration("address is not a valid EVM address".into()))
	}
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
	fn chain_id(&self) -> ChainId {
		self.chain_id
	}

	async fn tip(&self) -> Result<u64, DeliveryError> {
		self.provider()
			.get_block_number()
			.await
			.map_err(|e| DeliveryError::Rpc(e.to_string()))
	}

	async fn scan_events(
		&self,
		contract: Address,
		topics: Vec<[u8; 32]>,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<RawEvent>, DeliveryError> {
		let address = Self::to_alloy_address(contract)?;
		let mut filter = Filter::new()
			.address(address)
			.from_block(from_block)
			.to_block(to_block);
		if let Some(sig) = topics.first() {
			filter = filter.event_signature(FixedBytes::<32>::from(*sig));
		}

		let logs: Vec<Log> = self
			.provider()
			.get_logs(&filter)
			.await
			.map_err(|e| DeliveryError::Rpc(e.to_string()))?;

		Ok(logs
			.into_iter()
			.map(|log| RawEvent {
				chain_id: self.chain_id,
				block_number: log.block_number.unwrap_or(0),
				log_index: log.log_index.unwrap_or(0),
				tx_hash: log.transaction_hash.map(|h| h.0.to_vec()).unwrap_or_default(),
				topics: log.topics().iter().map(|t| t.0.to_vec()).collect(),
				data: log.data().data.clone().to_vec(),
			})
			.collect())
	}

	async fn submit_fill(
		&self,
		settler: Address,
		order_id: [u8; 32],
		origin_data: &[u8],
		filler_data: &[u8],
	) -> Result<TxRef, DeliveryError> {
		let to = Self::to_alloy_address(settler)?;
		let call_data = IDestinationSettler::fillCall {
			orderId: FixedBytes::<32>::from(order_id),
			originData: Bytes::copy_from_slice(origin_data),
			fillerData: Bytes::copy_from_slice(filler_data),
		}
		.abi_encode();

		let tx = TransactionRequest::default().to(to).input(call_data.into());
		let pending = self
			.provider()
			.send_transaction(tx)
			.await
			.map_err(|e| DeliveryError::Rpc(format!("submit_fill: {}", e)))?;
		let tx_hash = *pending.tx_hash();
		self.wait_for_receipt(tx_hash).await?;
		Ok(format!("0x{}", hex::encode(tx_hash)))
	}

	async fn submit_settle(
		&self,
		settler: Address,
		order_ids: &[[u8; 32]],
		fee_value: TokenAmount,
	) -> Result<TxRef, DeliveryError> {
		let to = Self::to_alloy_address(settler)?;
		let call_data = IDestinationSettler::settleCall {
			orderIds: order_ids.iter().map(|id| FixedBytes::<32>::from(*id)).collect(),
			feeValue: fee_value.0,
		}
		.abi_encode();

		let tx = TransactionRequest::default().to(to).input(call_data.into());
		let pending = self
			.provider()
			.send_transaction(tx)
			.await
			.map_err(|e| DeliveryError::Rpc(format!("submit_settle: {}", e)))?;
		let tx_hash = *pending.tx_hash();
		self.wait_for_receipt(tx_hash).await?;
		Ok(format!("0x{}", hex::encode(tx_hash)))
	}

	async fn erc20_balance(&self, token: Address, holder: Address) -> Result<TokenAmount, DeliveryError> {
		let token_addr = Self::to_alloy_address(token)?;
		let holder_addr = Self::to_alloy_address(holder)?;
		let call_data = IERC20::balanceOfCall { owner: holder_addr }.abi_encode();

		let result = self
			.provider()
			.call(&TransactionRequest::default().to(token_addr).input(call_data.into()))
			.await
			.map_err(|e| DeliveryError::Rpc(format!("balanceOf: {}", e)))?;
		if result.len() < 32 {
			return Err(DeliveryError::Decode("balanceOf returned short data".into()));
		}
		Ok(TokenAmount(U256::from_be_slice(&result[..32])))
	}

	async fn erc20_allowance(
		&self,
		token: Address,
		holder: Address,
		spender: Address,
	) -> Result<TokenAmount, DeliveryError> {
		let token_addr = Self::to_alloy_address(token)?;
		let call_data = IERC20::allowanceCall {
			owner: Self::to_alloy_address(holder)?,
			spender: Self::to_alloy_address(spender)?,
		}
		.abi_encode();

		let result = self
			.provider()
			.call(&TransactionRequest::default().to(token_addr).input(call_data.into()))
			.await
			.map_err(|e| DeliveryError::Rpc(format!("allowance: {}", e)))?;
		if result.len() < 32 {
			return Err(DeliveryError::Decode("allowance returned short data".into()));
		}
		Ok(TokenAmount(U256::from_be_slice(&result[..32])))
	}

	async fn erc20_approve(
		&self,
		token: Address,
		spender: Address,
		amount: TokenAmount,
	) -> Result<TxRef, DeliveryError> {
		let token_addr = Self::to_alloy_address(token)?;
		let call_data = IERC20::approveCall {
			spender: Self::to_alloy_address(spender)?,
			amount: amount.0,
		}
		.abi_encode();

		let tx = TransactionRequest::default().to(token_addr).input(call_data.into());
		let pending = self
			.provider()
			.send_transaction(tx)
			.await
			.map_err(|e| DeliveryError::Rpc(format!("approve: {}", e)))?;
		let tx_hash = *pending.tx_hash();
		self.wait_for_receipt(tx_hash).await?;
		Ok(format!("0x{}", hex::encode(tx_hash)))
	}

	async fn query_order_status(
		&self,
		settler: Address,
		order_id: [u8; 32],
	) -> Result<OrderStatusCode, DeliveryError> {
		let to = Self::to_alloy_address(settler)?;
		let call_data = IDestinationSettler::orderStatusCall {
			orderId: FixedBytes::<32>::from(order_id),
		}
		.abi_encode();

		let result = self
			.provider()
			.call(&TransactionRequest::default().to(to).input(call_data.into()))
			.await
			.map_err(|e| DeliveryError::Rpc(format!("orderStatus: {}", e)))?;
		if result.len() < 32 {
			return Ok(OrderStatusCode::Unknown);
		}
		Ok(decode_status_word(&result[..32]))
	}
}

/// Settler contracts return order status as a short ASCII tag right-padded to 32
/// bytes ("OPENED", "FILLED", "SETTLED", "REFUNDED"); anything else is `Unknown`.
fn decode_status_word(word: &[u8]) -> OrderStatusCode {
	let end = word.iter().position(|&b| b == 0).unwrap_or(word.len());
	match &word[..end] {
		b"OPENED" => OrderStatusCode::Opened,
		b"FILLED" => OrderStatusCode::Filled,
		b"SETTLED" => OrderStatusCode::Settled,
		b"REFUNDED" => OrderStatusCode::Refunded,
		_ => OrderStatusCode::Unknown,
	}
}

/// Decodes the origin-chain `Open`/destination-chain `Filled` events into the
/// canonical data model (SPEC_FULL.md §4.C).
pub struct EvmEventDecoder;

impl EventDecoder for EvmEventDecoder {
	fn decode_open(&self, raw: &RawEvent) -> Result<ResolvedOrder, DeliveryError> {
		let prim_log = PrimLog {
			address: AlloyAddress::ZERO,
			data: LogData::new_unchecked(
				raw.topics
					.iter()
					.map(|t| FixedBytes::<32>::from_slice(t))
					.collect(),
				Bytes::copy_from_slice(&raw.data),
			),
		};
		let open_event = Open::decode_log(&prim_log, true)
			.map_err(|e| DeliveryError::Decode(format!("Open log: {}", e)))?;
		let order_id: [u8; 32] = open_event.orderId.0;

		let order = StandardOrder::abi_decode(&open_event.order, true)
			.map_err(|e| DeliveryError::Decode(format!("StandardOrder: {}", e)))?;

		if order.outputs.is_empty() {
			return Err(DeliveryError::Decode("order has no outputs".into()));
		}

		let max_spent = order
			.outputs
			.iter()
			.map(|o| solver_types::Output {
				token: Address(pad_felt(o.token.0)),
				amount: TokenAmount(o.amount),
				recipient: Address(pad_felt(o.recipient.0)),
				chain_id: ChainId(u64::try_from(o.chainId).unwrap_or(u64::MAX)),
			})
			.collect::<Vec<_>>();

		let fill_instructions = order
			.outputs
			.iter()
			.map(|o| FillInstruction {
				destination_chain_id: ChainId(u64::try_from(o.chainId).unwrap_or(u64::MAX)),
				destination_settler: Address(pad_felt(o.settler.0)),
				origin_data: o.call.to_vec(),
			})
			.collect();

		let origin_chain_id = ChainId(u64::try_from(order.originChainId).unwrap_or(u64::MAX));

		// `inputs` is `[tokenId, amount][]`: the tokens locked on origin that the
		// filler collects once settle succeeds. `tokenId` is the token address
		// encoded as a uint256 (big-endian, so it lands in the low 20 bytes of the
		// 32-byte canonical form unpadded). There is no recipient encoded on-chain
		// here — settle() pays out whoever claims the order — so it is left zero at
		// decode time.
		let min_received = order
			.inputs
			.iter()
			.map(|input| solver_types::Output {
				token: Address(input[0].to_be_bytes::<32>()),
				amount: TokenAmount(input[1]),
				recipient: Address::ZERO,
				chain_id: origin_chain_id,
			})
			.collect::<Vec<_>>();

		let resolved = ResolvedOrder {
			user: Address::from_evm(order.user.into_array()),
			origin_chain_id,
			open_deadline: order.expires as u64,
			fill_deadline: order.fillDeadline as u64,
			order_id,
			max_spent,
			min_received,
			fill_instructions,
		};
		validate_resolved_order(&resolved)?;
		Ok(resolved)
	}

	fn decode_filled(&self, raw: &RawEvent) -> Result<FillEvent, DeliveryError> {
		let prim_log = PrimLog {
			address: AlloyAddress::ZERO,
			data: LogData::new_unchecked(
				raw.topics
					.iter()
					.map(|t| FixedBytes::<32>::from_slice(t))
					.collect(),
				Bytes::copy_from_slice(&raw.data),
			),
		};
		let filled = Filled::decode_log(&prim_log, true)
			.map_err(|e| DeliveryError::Decode(format!("Filled log: {}", e)))?;

		Ok(FillEvent {
			order_id: filled.orderId.0,
			filler: Address(filled.filler.0),
			fill_tx_ref: format!("0x{}", hex::encode(&raw.tx_hash)),
		})
	}

	fn open_topic(&self) -> [u8; 32] {
		Open::SIGNATURE_HASH.0
	}

	fn filled_topic(&self) -> [u8; 32] {
		Filled::SIGNATURE_HASH.0
	}
}

fn pad_felt(bytes32: FixedBytes<32>) -> [u8; 32] {
	bytes32.0
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_word_round_trip() {
		let mut w = [0u8; 32];
		w[..6].copy_from_slice(b"FILLED");
		assert_eq!(decode_status_word(&w), OrderStatusCode::Filled);
	}

	#[test]
	fn unknown_status_word() {
		let w = [0u8; 32];
		assert_eq!(decode_status_word(&w), OrderStatusCode::Unknown);
	}
}
