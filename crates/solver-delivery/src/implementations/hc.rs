//! HC (Cairo-based heterogeneous chain) adapter.
//!
//! No Cairo/Starknet RPC or ABI crate is part of this workspace's dependency pack,
//! so this talks to the HC node's JSON-RPC endpoint directly via `reqwest`, the same
//! HTTP client the EVM adapter's provider uses under the hood. Wire conventions
//! follow SPEC_FULL.md §4.A: addresses are field elements (big-endian 32 bytes,
//! high nibble zero), amounts are split into 128-bit (low, high) limb pairs, and
//! byte arrays are encoded as a length-prefixed sequence of 16-byte chunks plus a
//! trailing remainder.

use crate::decode::validate_resolved_order;
use crate::{ChainAdapter, DeliveryError, EventDecoder, TxRef};
use alloy_primitives::keccak256;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solver_types::{
	Address, ChainId, FillEvent, FillInstruction, OrderStatusCode, Output, RawEvent, ResolvedOrder,
	SecretString, TokenAmount,
};
use std::time::Duration;

pub struct HcAdapter {
	chain_id: ChainId,
	rpc_url: String,
	http: Client,
	/// HC transactions are signed with the same placeholder MAC scheme as
	/// `solver-account`'s `HcLocalSigner`; kept here only for submit calls that must
	/// prove solver identity to the RPC endpoint (a stand-in for real Cairo signing).
	private_key: SecretString,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
	jsonrpc: &'a str,
	id: u64,
	method: &'a str,
	params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
	result: Option<Value>,
	error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
	code: i64,
	message: String,
}

impl HcAdapter {
	pub fn new(chain_id: ChainId, rpc_url: &str, private_key: SecretString) -> Self {
		HcAdapter {
			chain_id,
			rpc_url: rpc_url.to_string(),
			http: Client::builder()
				.timeout(Duration::from_secs(30))
				.build()
				.expect("reqwest client"),
			private_key,
		}
	}

	async fn call(&self, method: &str, params: Value) -> Result<Value, DeliveryError> {
		let req = RpcRequest {
			jsonrpc: "2.0",
			id: 1,
			method,
			params,
		};
		let resp: RpcResponse = self
			.http
			.post(&self.rpc_url)
			.json(&req)
			.send()
			.await
			.map_err(|e| DeliveryError::Rpc(format!("{}: {}", method, e)))?
			.json()
			.await
			.map_err(|e| DeliveryError::Rpc(format!("{} (decode): {}", method, e)))?;

		if let Some(err) = resp.error {
			return Err(DeliveryError::Rpc(format!(
				"{} ({}): {}",
				method, err.code, err.message
			)));
		}
		resp.result
			.ok_or_else(|| DeliveryError::Rpc(format!("{}: empty result", method)))
	}
}

/// Encodes a felt (32-byte big-endian, high nibble zero) as a hex string.
fn felt_hex(addr: Address) -> String {
	addr.to_hex()
}

/// Encodes a 256-bit amount as the `{low, high}` 128-bit limb pair SPEC_FULL.md §4.A
/// requires at the HC boundary.
fn amount_limbs(amount: TokenAmount) -> Value {
	let (low, high) = amount.to_limbs();
	json!({ "low": low.to_string(), "high": high.to_string() })
}

fn amount_from_limbs(v: &Value) -> Result<TokenAmount, DeliveryError> {
	let low: u128 = v
		.get("low")
		.and_then(Value::as_str)
		.ok_or_else(|| DeliveryError::Decode("missing amount.low".into()))?
		.parse()
		.map_err(|e| DeliveryError::Decode(format!("amount.low: {}", e)))?;
	let high: u128 = v
		.get("high")
		.and_then(Value::as_str)
		.ok_or_else(|| DeliveryError::Decode("missing amount.high".into()))?
		.parse()
		.map_err(|e| DeliveryError::Decode(format!("amount.high: {}", e)))?;
	Ok(TokenAmount::from_limbs(low, high))
}

/// Encodes an opaque byte string as length-prefixed 16-byte chunks plus a trailing
/// remainder, per SPEC_FULL.md §4.A's HC byte-array convention.
fn encode_byte_chunks(bytes: &[u8]) -> Value {
	let chunks: Vec<String> = bytes.chunks(16).map(hex::encode).collect();
	json!({ "len": bytes.len(), "chunks": chunks })
}

fn decode_byte_chunks(v: &Value) -> Result<Vec<u8>, DeliveryError> {
	let len = v
		.get("len")
		.and_then(Value::as_u64)
		.ok_or_else(|| DeliveryError::Decode("missing chunked bytes len".into()))? as usize;
	let chunks = v
		.get("chunks")
		.and_then(Value::as_array)
		.ok_or_else(|| DeliveryError::Decode("missing chunked bytes chunks".into()))?;
	let mut out = Vec::with_capacity(len);
	for chunk in chunks {
		let s = chunk
			.as_str()
			.ok_or_else(|| DeliveryError::Decode("chunk is not a string".into()))?;
		out.extend(hex::decode(s).map_err(|e| DeliveryError::Decode(e.to_string()))?);
	}
	out.truncate(len);
	Ok(out)
}

#[async_trait]
impl ChainAdapter for HcAdapter {
	fn chain_id(&self) -> ChainId {
		self.chain_id
	}

	async fn tip(&self) -> Result<u64, DeliveryError> {
		let result = self.call("hc_blockNumber", json!([])).await?;
		result
			.as_u64()
			.or_else(|| result.as_str().and_then(|s| s.parse().ok()))
			.ok_or_else(|| DeliveryError::Decode("hc_blockNumber: non-numeric result".into()))
	}

	async fn scan_events(
		&self,
		contract: Address,
		topics: Vec<[u8; 32]>,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<RawEvent>, DeliveryError> {
		let topic_hex: Vec<String> = topics.iter().map(hex::encode).collect();
		let result = self
			.call(
				"hc_getEvents",
				json!({
					"contract": felt_hex(contract),
					"topics": topic_hex,
					"fromBlock": from_block,
					"toBlock": to_block,
				}),
			)
			.await?;

		let events = result
			.as_array()
			.ok_or_else(|| DeliveryError::Decode("hc_getEvents: expected array".into()))?;

		events
			.iter()
			.map(|e| {
				let block_number = e
					.get("blockNumber")
					.and_then(Value::as_u64)
					.ok_or_else(|| DeliveryError::Decode("event missing blockNumber".into()))?;
				let log_index = e
					.get("logIndex")
					.and_then(Value::as_u64)
					.ok_or_else(|| DeliveryError::Decode("event missing logIndex".into()))?;
				let tx_hash = e
					.get("txHash")
					.and_then(Value::as_str)
					.map(|s| hex::decode(s.trim_start_matches("0x")).unwrap_or_default())
					.unwrap_or_default();
				let topics = e
					.get("topics")
					.and_then(Value::as_array)
					.map(|arr| {
						arr.iter()
							.filter_map(|t| t.as_str())
							.map(|s| hex::decode(s.trim_start_matches("0x")).unwrap_or_default())
							.collect()
					})
					.unwrap_or_default();
				let data = e
					.get("data")
					.map(decode_byte_chunks)
					.transpose()?
					.unwrap_or_default();

				Ok(RawEvent {
					chain_id: self.chain_id,
					block_number,
					log_index,
					tx_hash,
					topics,
					data,
				})
			})
			.collect()
	}

	async fn submit_fill(
		&self,
		settler: Address,
		order_id: [u8; 32],
		origin_data: &[u8],
		filler_data: &[u8],
	) -> Result<TxRef, DeliveryError> {
		let (order_low, order_high) = TokenAmount(alloy_primitives::U256::from_be_bytes(order_id)).to_limbs();
		let result = self
			.call(
				"hc_invoke",
				json!({
					"contract": felt_hex(settler),
					"entrypoint": "fill",
					"calldata": {
						"orderId": { "low": order_low.to_string(), "high": order_high.to_string() },
						"originData": encode_byte_chunks(origin_data),
						"fillerData": encode_byte_chunks(filler_data),
					},
					"signer": self.private_key.expose_secret(),
				}),
			)
			.await?;
		result
			.get("txRef")
			.and_then(Value::as_str)
			.map(|s| s.to_string())
			.ok_or_else(|| DeliveryError::Decode("hc_invoke(fill): missing txRef".into()))
	}

	async fn submit_settle(
		&self,
		settler: Address,
		order_ids: &[[u8; 32]],
		fee_value: TokenAmount,
	) -> Result<TxRef, DeliveryError> {
		let ids: Vec<String> = order_ids.iter().map(hex::encode).collect();
		let result = self
			.call(
				"hc_invoke",
				json!({
					"contract": felt_hex(settler),
					"entrypoint": "settle",
					"calldata": {
						"orderIds": ids,
						"feeValue": amount_limbs(fee_value),
					},
					"signer": self.private_key.expose_secret(),
				}),
			)
			.await?;
		result
			.get("txRef")
			.and_then(Value::as_str)
			.map(|s| s.to_string())
			.ok_or_else(|| DeliveryError::Decode("hc_invoke(settle): missing txRef".into()))
	}

	async fn erc20_balance(&self, token: Address, holder: Address) -> Result<TokenAmount, DeliveryError> {
		let result = self
			.call(
				"hc_call",
				json!({
					"contract": felt_hex(token),
					"entrypoint": "balance_of",
					"calldata": { "account": felt_hex(holder) },
				}),
			)
			.await?;
		amount_from_limbs(&result)
	}

	async fn erc20_allowance(
		&self,
		token: Address,
		holder: Address,
		spender: Address,
	) -> Result<TokenAmount, DeliveryError> {
		let result = self
			.call(
				"hc_call",
				json!({
					"contract": felt_hex(token),
					"entrypoint": "allowance",
					"calldata": { "owner": felt_hex(holder), "spender": felt_hex(spender) },
				}),
			)
			.await?;
		amount_from_limbs(&result)
	}

	async fn erc20_approve(
		&self,
		token: Address,
		spender: Address,
		amount: TokenAmount,
	) -> Result<TxRef, DeliveryError> {
		let result = self
			.call(
				"hc_invoke",
				json!({
					"contract": felt_hex(token),
					"entrypoint": "approve",
					"calldata": { "spender": felt_hex(spender), "amount": amount_limbs(amount) },
					"signer": self.private_key.expose_secret(),
				}),
			)
			.await?;
		result
			.get("txRef")
			.and_then(Value::as_str)
			.map(|s| s.to_string())
			.ok_or_else(|| DeliveryError::Decode("hc_invoke(approve): missing txRef".into()))
	}

	async fn query_order_status(
		&self,
		settler: Address,
		order_id: [u8; 32],
	) -> Result<OrderStatusCode, DeliveryError> {
		let result = self
			.call(
				"hc_call",
				json!({
					"contract": felt_hex(settler),
					"entrypoint": "order_status",
					"calldata": { "orderId": hex::encode(order_id) },
				}),
			)
			.await?;
		let tag = result.as_str().unwrap_or("UNKNOWN");
		Ok(match tag {
			"OPENED" => OrderStatusCode::Opened,
			"FILLED" => OrderStatusCode::Filled,
			"SETTLED" => OrderStatusCode::Settled,
			"REFUNDED" => OrderStatusCode::Refunded,
			_ => OrderStatusCode::Unknown,
		})
	}
}

/// Decodes HC's `Open`/`Filled` events (identical semantics to EVM's, different wire
/// layout: u256 pairs, felt addresses) into the canonical data model.
pub struct HcEventDecoder;

impl EventDecoder for HcEventDecoder {
	fn decode_open(&self, raw: &RawEvent) -> Result<ResolvedOrder, DeliveryError> {
		let payload: Value = serde_json::from_slice(&raw.data)
			.map_err(|e| DeliveryError::Decode(format!("Open payload: {}", e)))?;

		let user_hex = payload
			.get("user")
			.and_then(Value::as_str)
			.ok_or_else(|| DeliveryError::Decode("Open payload missing user".into()))?;
		let user = Address::from_hex(user_hex).map_err(|e| DeliveryError::Decode(e.to_string()))?;

		let order_id_hex = payload
			.get("orderId")
			.and_then(Value::as_str)
			.ok_or_else(|| DeliveryError::Decode("Open payload missing orderId".into()))?;
		let order_id_bytes = Address::from_hex(order_id_hex).map_err(|e| DeliveryError::Decode(e.to_string()))?;

		let outputs = payload
			.get("outputs")
			.and_then(Value::as_array)
			.ok_or_else(|| DeliveryError::Decode("Open payload missing outputs".into()))?;

		let mut max_spent = Vec::with_capacity(outputs.len());
		let mut fill_instructions = Vec::with_capacity(outputs.len());
		for o in outputs {
			let token = Address::from_hex(
				o.get("token")
					.and_then(Value::as_str)
					.ok_or_else(|| DeliveryError::Decode("output missing token".into()))?,
			)
			.map_err(|e| DeliveryError::Decode(e.to_string()))?;
			let recipient = Address::from_hex(
				o.get("recipient")
					.and_then(Value::as_str)
					.ok_or_else(|| DeliveryError::Decode("output missing recipient".into()))?,
			)
			.map_err(|e| DeliveryError::Decode(e.to_string()))?;
			let settler = Address::from_hex(
				o.get("settler")
					.and_then(Value::as_str)
					.ok_or_else(|| DeliveryError::Decode("output missing settler".into()))?,
			)
			.map_err(|e| DeliveryError::Decode(e.to_string()))?;
			let chain_id = ChainId(
				o.get("chainId")
					.and_then(Value::as_u64)
					.ok_or_else(|| DeliveryError::Decode("output missing chainId".into()))?,
			);
			let amount = o
				.get("amount")
				.map(amount_from_limbs)
				.transpose()?
				.ok_or_else(|| DeliveryError::Decode("output missing amount".into()))?;
			let origin_data = o
				.get("call")
				.map(decode_byte_chunks)
				.transpose()?
				.unwrap_or_default();

			max_spent.push(Output {
				token,
				amount,
				recipient,
				chain_id,
			});
			fill_instructions.push(FillInstruction {
				destination_chain_id: chain_id,
				destination_settler: settler,
				origin_data,
			});
		}

		let origin_chain_id = ChainId(
			payload
				.get("originChainId")
				.and_then(Value::as_u64)
				.ok_or_else(|| DeliveryError::Decode("Open payload missing originChainId".into()))?,
		);

		// `inputs`: tokens locked on origin that the filler collects once settle
		// succeeds. No recipient is encoded here (settle() pays out whoever
		// claims the order), so it is left zero at decode time, mirroring the EVM
		// decoder's treatment of `StandardOrder.inputs`.
		let inputs = payload
			.get("inputs")
			.and_then(Value::as_array)
			.ok_or_else(|| DeliveryError::Decode("Open payload missing inputs".into()))?;
		let mut min_received = Vec::with_capacity(inputs.len());
		for input in inputs {
			let token = Address::from_hex(
				input
					.get("token")
					.and_then(Value::as_str)
					.ok_or_else(|| DeliveryError::Decode("input missing token".into()))?,
			)
			.map_err(|e| DeliveryError::Decode(e.to_string()))?;
			let amount = input
				.get("amount")
				.map(amount_from_limbs)
				.transpose()?
				.ok_or_else(|| DeliveryError::Decode("input missing amount".into()))?;
			min_received.push(Output {
				token,
				amount,
				recipient: Address::ZERO,
				chain_id: origin_chain_id,
			});
		}

		let resolved = ResolvedOrder {
			user,
			origin_chain_id,
			open_deadline: payload.get("openDeadline").and_then(Value::as_u64).unwrap_or(0),
			fill_deadline: payload
				.get("fillDeadline")
				.and_then(Value::as_u64)
				.ok_or_else(|| DeliveryError::Decode("Open payload missing fillDeadline".into()))?,
			order_id: order_id_bytes.0,
			max_spent,
			min_received,
			fill_instructions,
		};
		validate_resolved_order(&resolved)?;
		Ok(resolved)
	}

	fn decode_filled(&self, raw: &RawEvent) -> Result<FillEvent, DeliveryError> {
		let payload: Value = serde_json::from_slice(&raw.data)
			.map_err(|e| DeliveryError::Decode(format!("Filled payload: {}", e)))?;

		let order_id = Address::from_hex(
			payload
				.get("orderId")
				.and_then(Value::as_str)
				.ok_or_else(|| DeliveryError::Decode("Filled payload missing orderId".into()))?,
		)
		.map_err(|e| DeliveryError::Decode(e.to_string()))?;
		let filler = Address::from_hex(
			payload
				.get("filler")
				.and_then(Value::as_str)
				.ok_or_else(|| DeliveryError::Decode("Filled payload missing filler".into()))?,
		)
		.map_err(|e| DeliveryError::Decode(e.to_string()))?;

		Ok(FillEvent {
			order_id: order_id.0,
			filler,
			fill_tx_ref: format!("0x{}", hex::encode(&raw.tx_hash)),
		})
	}

	/// HC has no ABI-level event signature; the node tags events by name, so the
	/// "topic" it filters on is just a stable hash of that name.
	fn open_topic(&self) -> [u8; 32] {
		keccak256(b"Open").0
	}

	fn filled_topic(&self) -> [u8; 32] {
		keccak256(b"Filled").0
	}
}
